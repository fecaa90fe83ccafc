//! The static group tree.
//!
//! [`GroupTree::build`] flattens a nested [`GroupSchema`] depth-first into an
//! array of [`Group`]s. The index of a group is its first-visit order, so a
//! parent always precedes its children and every subtree occupies the
//! contiguous index range `[index, index + group_count)`.
//!
//! ```text
//! 0 root
//! ├── 1 video
//! │   └── 2 scale
//! └── 3 audio
//!
//! subtree(1) == 1..3
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

use crate::schema::{GroupSchema, SchemaEntry};
use crate::value::{OptionKind, OptionValue};

/// Stable identity of one option: its group index and its position in the
/// group's declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptionId {
    group: usize,
    option: usize,
}

impl OptionId {
    const INDEX_BITS: u32 = 16;
    const INDEX_MASK: u32 = (1 << Self::INDEX_BITS) - 1;

    /// Create an id from a group index and an option index.
    pub const fn new(group: usize, option: usize) -> Self {
        Self { group, option }
    }

    /// Index of the group the option lives in.
    pub const fn group(&self) -> usize {
        self.group
    }

    /// Index of the option within its group.
    pub const fn option(&self) -> usize {
        self.option
    }

    /// Pack into a `u32` as `group << 16 | option`.
    ///
    /// # Panics
    ///
    /// Panics if either index does not fit into 16 bits.
    pub fn to_raw(&self) -> u32 {
        assert!(
            self.group <= Self::INDEX_MASK as usize && self.option <= Self::INDEX_MASK as usize,
            "option id {self} does not fit into 32 bits"
        );
        ((self.group as u32) << Self::INDEX_BITS) | self.option as u32
    }

    /// Unpack an id produced by [`to_raw`](Self::to_raw).
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            group: (raw >> Self::INDEX_BITS) as usize,
            option: (raw & Self::INDEX_MASK) as usize,
        }
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.option)
    }
}

/// Typed handle to an option whose values are of type `T`.
///
/// Obtained from [`GroupTree::opt`], which checks the kind once so typed
/// accessors never have to fail.
pub struct Opt<T> {
    id: OptionId,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Opt<T> {
    /// Untyped id of this option.
    pub const fn id(&self) -> OptionId {
        self.id
    }
}

impl<T> Clone for Opt<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Opt<T> {}

impl<T> PartialEq for Opt<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Opt<T> {}

impl<T> Hash for Opt<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Opt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Opt").field(&self.id).finish()
    }
}

impl<T> From<Opt<T>> for OptionId {
    fn from(opt: Opt<T>) -> Self {
        opt.id
    }
}

/// Immutable description of one option in the tree.
#[derive(Clone)]
pub struct OptionDescriptor {
    name: String,
    full_name: String,
    kind: OptionKind,
    change_flags: u64,
    default: Arc<dyn OptionValue>,
}

impl OptionDescriptor {
    /// Name local to the group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name including the group prefix, e.g. `video-scale-filter`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Kind of the option's values.
    pub fn kind(&self) -> OptionKind {
        self.kind
    }

    /// Change flags declared on the option itself.
    pub fn change_flags(&self) -> u64 {
        self.change_flags
    }

    /// Default value.
    pub fn default_value(&self) -> &dyn OptionValue {
        self.default.as_ref()
    }
}

impl fmt::Debug for OptionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionDescriptor")
            .field("full_name", &self.full_name)
            .field("kind", &self.kind)
            .field("change_flags", &format_args!("{:#x}", self.change_flags))
            .finish_non_exhaustive()
    }
}

/// One group of the flattened tree.
#[derive(Debug)]
pub struct Group {
    schema: Arc<GroupSchema>,
    index: usize,
    parent: Option<usize>,
    parent_entry: Option<String>,
    prefix: String,
    group_count: usize,
    options: Vec<OptionDescriptor>,
}

impl Group {
    /// Schema this group was built from.
    pub fn schema(&self) -> &Arc<GroupSchema> {
        &self.schema
    }

    /// Index in the tree.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Index of the parent group, `None` for the root.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Name of the parent entry this group hangs off.
    pub fn parent_entry(&self) -> Option<&str> {
        self.parent_entry.as_deref()
    }

    /// Full name prefix of the group's options. Empty at the root.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of groups in this group's subtree, including itself.
    pub fn group_count(&self) -> usize {
        self.group_count
    }

    /// Options in declaration order.
    pub fn options(&self) -> &[OptionDescriptor] {
        &self.options
    }

    /// Index range of this group's subtree.
    pub fn subtree(&self) -> Range<usize> {
        self.index..self.index + self.group_count
    }
}

/// The flattened schema tree shared by a shadow store and its caches.
#[derive(Debug)]
pub struct GroupTree {
    groups: Vec<Group>,
}

impl GroupTree {
    /// Flatten `root` into a tree.
    ///
    /// # Panics
    ///
    /// Panics if the same schema (by `Arc` identity) appears more than once.
    pub fn build(root: Arc<GroupSchema>) -> Self {
        let mut groups = Vec::new();
        add_group(&mut groups, root, None, None, String::new());
        Self { groups }
    }

    /// Number of groups in the tree.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// All groups in index order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// The root group.
    pub fn root(&self) -> &Group {
        &self.groups[0]
    }

    /// Group at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn group(&self, index: usize) -> &Group {
        assert!(
            index < self.groups.len(),
            "group index {index} out of range (tree has {} groups)",
            self.groups.len()
        );
        &self.groups[index]
    }

    /// Index of the group built from `schema`.
    pub fn group_index(&self, schema: &Arc<GroupSchema>) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| Arc::ptr_eq(&group.schema, schema))
    }

    /// Index range of the subtree rooted at `index`.
    pub fn subtree(&self, index: usize) -> Range<usize> {
        self.group(index).subtree()
    }

    /// Check if `group` is `ancestor` or lies below it.
    pub fn is_ancestor(&self, ancestor: usize, group: usize) -> bool {
        let mut current = Some(group);
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.group(index).parent;
        }
        false
    }

    /// Descriptor of the option `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not name an option of this tree.
    pub fn descriptor(&self, id: OptionId) -> &OptionDescriptor {
        let group = self.group(id.group());
        assert!(
            id.option() < group.options.len(),
            "option {id} out of range (group '{}' has {} options)",
            group.schema.name(),
            group.options.len()
        );
        &group.options[id.option()]
    }

    /// Full name of the option `id`.
    pub fn full_name(&self, id: OptionId) -> &str {
        self.descriptor(id).full_name()
    }

    /// Default value of the option `id`.
    pub fn default_value(&self, id: OptionId) -> &dyn OptionValue {
        self.descriptor(id).default_value()
    }

    /// Look up an option by its group schema and local name.
    pub fn option_id(&self, schema: &Arc<GroupSchema>, name: &str) -> Option<OptionId> {
        let group = self.group_index(schema)?;
        let option = self.groups[group]
            .options
            .iter()
            .position(|descriptor| descriptor.name == name)?;
        Some(OptionId::new(group, option))
    }

    /// Resolve a typed handle. Returns `None` if the option does not exist or
    /// its values are not of type `T`.
    pub fn opt<T: OptionValue>(&self, schema: &Arc<GroupSchema>, name: &str) -> Option<Opt<T>> {
        let id = self.option_id(schema, name)?;
        self.descriptor(id).kind.is::<T>().then_some(Opt {
            id,
            _kind: PhantomData,
        })
    }

    /// Every option of the tree, groups ascending, options in declaration
    /// order.
    pub fn option_ids(&self) -> impl Iterator<Item = OptionId> + '_ {
        self.option_ids_in(0..self.groups.len())
    }

    /// Every option of the groups in `range`, in tree order.
    pub fn option_ids_in(&self, range: Range<usize>) -> impl Iterator<Item = OptionId> + '_ {
        self.groups[range].iter().flat_map(|group| {
            (0..group.options.len()).map(move |option| OptionId::new(group.index, option))
        })
    }

    /// Change mask of `id` as seen from a cache rooted at `root`: the
    /// option's own flags plus the group flags of every group from the
    /// option's group up to, but excluding, `root`.
    ///
    /// # Panics
    ///
    /// Panics if the option's group is not within `root`'s subtree.
    pub fn change_mask(&self, id: OptionId, root: usize) -> u64 {
        assert!(
            self.is_ancestor(root, id.group()),
            "option {id} is outside the subtree of group {root}"
        );
        let mut mask = self.descriptor(id).change_flags;
        let mut index = id.group();
        while index != root {
            let group = &self.groups[index];
            mask |= group.schema.change_flags();
            match group.parent {
                Some(parent) => index = parent,
                None => break,
            }
        }
        mask
    }
}

fn join_name(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_owned(),
        (false, true) => prefix.to_owned(),
        (false, false) => format!("{prefix}-{name}"),
    }
}

fn add_group(
    groups: &mut Vec<Group>,
    schema: Arc<GroupSchema>,
    parent: Option<usize>,
    parent_entry: Option<String>,
    inherited_prefix: String,
) -> usize {
    assert!(
        !groups.iter().any(|group| Arc::ptr_eq(&group.schema, &schema)),
        "group schema '{}' used more than once",
        schema.name()
    );

    let index = groups.len();
    let prefix = schema
        .prefix()
        .map_or(inherited_prefix, str::to_owned);
    let options = schema
        .options()
        .map(|spec| OptionDescriptor {
            name: spec.name().to_owned(),
            full_name: join_name(&prefix, spec.name()),
            kind: spec.kind(),
            change_flags: spec.change_flags(),
            default: spec.shared_default(),
        })
        .collect();

    groups.push(Group {
        schema: Arc::clone(&schema),
        index,
        parent,
        parent_entry,
        prefix: prefix.clone(),
        group_count: 1,
        options,
    });

    for entry in schema.entries() {
        match entry {
            SchemaEntry::Value(_) => {}
            SchemaEntry::SubGroup {
                name,
                schema: child,
            } => {
                add_group(
                    groups,
                    Arc::clone(child),
                    Some(index),
                    Some(name.clone()),
                    join_name(&prefix, name),
                );
            }
            SchemaEntry::ObjectList { name, entries } => {
                for child in entries {
                    add_group(
                        groups,
                        Arc::clone(child),
                        Some(index),
                        Some(name.clone()),
                        String::new(),
                    );
                }
            }
        }
    }

    groups[index].group_count = groups.len() - index;
    index
}
