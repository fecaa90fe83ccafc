//! Value storage for a contiguous range of groups.

use std::ops::Range;

use crate::error::StoreResult;
use crate::tree::{GroupTree, OptionId};
use crate::value::OptionValue;

/// Values and version of one group.
#[derive(Debug)]
pub(crate) struct GroupData {
    pub(crate) values: Vec<Box<dyn OptionValue>>,
    pub(crate) version: u64,
}

/// Values of the groups `[start, start + groups.len())` of a tree.
#[derive(Debug)]
pub(crate) struct ConfigData {
    start: usize,
    groups: Vec<GroupData>,
}

impl ConfigData {
    /// Storage for `range`, filled with the schema defaults at version 0.
    pub(crate) fn from_defaults(tree: &GroupTree, range: Range<usize>) -> StoreResult<Self> {
        Self::build(tree, range, |id| tree.default_value(id), |_| 0)
    }

    /// Storage for `range`, copied from `src` including versions.
    pub(crate) fn copy_of(
        tree: &GroupTree,
        src: &Self,
        range: Range<usize>,
    ) -> StoreResult<Self> {
        Self::build(tree, range, |id| src.value(id), |group| src.group(group).version)
    }

    fn build<'a>(
        tree: &GroupTree,
        range: Range<usize>,
        value: impl Fn(OptionId) -> &'a dyn OptionValue,
        version: impl Fn(usize) -> u64,
    ) -> StoreResult<Self> {
        let mut groups = Vec::new();
        groups.try_reserve_exact(range.len())?;
        for index in range.clone() {
            let count = tree.group(index).options().len();
            let mut values = Vec::new();
            values.try_reserve_exact(count)?;
            for option in 0..count {
                values.push(value(OptionId::new(index, option)).clone_value());
            }
            groups.push(GroupData {
                values,
                version: version(index),
            });
        }
        Ok(Self {
            start: range.start,
            groups,
        })
    }

    pub(crate) fn range(&self) -> Range<usize> {
        self.start..self.start + self.groups.len()
    }

    pub(crate) fn contains_group(&self, group: usize) -> bool {
        self.range().contains(&group)
    }

    pub(crate) fn group(&self, group: usize) -> &GroupData {
        assert!(
            self.contains_group(group),
            "group {group} outside of {:?}",
            self.range()
        );
        &self.groups[group - self.start]
    }

    pub(crate) fn group_mut(&mut self, group: usize) -> &mut GroupData {
        assert!(
            self.contains_group(group),
            "group {group} outside of {:?}",
            self.range()
        );
        &mut self.groups[group - self.start]
    }

    pub(crate) fn value(&self, id: OptionId) -> &dyn OptionValue {
        self.group(id.group()).values[id.option()].as_ref()
    }

    pub(crate) fn value_mut(&mut self, id: OptionId) -> &mut dyn OptionValue {
        self.group_mut(id.group()).values[id.option()].as_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::GroupSchema;

    fn tree() -> GroupTree {
        let child = GroupSchema::builder("child").option("level", 3_u32).build();
        let root = GroupSchema::builder("root")
            .option("name", String::from("default"))
            .sub_group("child", child)
            .build();
        GroupTree::build(root)
    }

    #[test]
    fn test_defaults_fill_every_group() {
        let tree = tree();
        let data = ConfigData::from_defaults(&tree, 0..2).unwrap();
        assert_eq!(data.range(), 0..2);
        assert!(data.value(OptionId::new(0, 0)).value_eq(&String::from("default")));
        assert!(data.value(OptionId::new(1, 0)).value_eq(&3_u32));
        assert_eq!(data.group(1).version, 0);
    }

    #[test]
    fn test_copy_of_sub_range_is_independent() {
        let tree = tree();
        let mut src = ConfigData::from_defaults(&tree, 0..2).unwrap();
        src.group_mut(1).version = 9;

        let copy = ConfigData::copy_of(&tree, &src, 1..2).unwrap();
        src.value_mut(OptionId::new(1, 0)).copy_from(&7_u32);

        assert_eq!(copy.range(), 1..2);
        assert_eq!(copy.group(1).version, 9);
        assert!(copy.value(OptionId::new(1, 0)).value_eq(&3_u32));
        assert!(!copy.contains_group(0));
    }

    #[test]
    #[should_panic(expected = "outside of")]
    fn test_access_outside_range_panics() {
        let tree = tree();
        let src = ConfigData::from_defaults(&tree, 0..2).unwrap();
        let copy = ConfigData::copy_of(&tree, &src, 1..2).unwrap();
        copy.value(OptionId::new(0, 0));
    }

    #[test]
    fn test_shared_tree_defaults_are_not_aliased() {
        let tree = Arc::new(tree());
        let mut a = ConfigData::from_defaults(&tree, 0..2).unwrap();
        let b = ConfigData::from_defaults(&tree, 0..2).unwrap();
        a.value_mut(OptionId::new(0, 0)).copy_from(&String::from("changed"));
        assert!(b.value(OptionId::new(0, 0)).value_eq(&String::from("default")));
    }
}
