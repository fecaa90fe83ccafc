//! Declarative description of option groups.
//!
//! A [`GroupSchema`] lists the options of one group in declaration order,
//! interleaved with nested sub-groups and object lists. Schemas are built
//! once at startup and shared as `Arc<GroupSchema>`; the `Arc` identity is
//! what the [`GroupTree`](crate::GroupTree) uses to tell groups apart.
//!
//! # Example
//!
//! ```
//! use optstore_core::GroupSchema;
//!
//! const UPDATE_VIDEO: u64 = 1 << 0;
//!
//! let scale = GroupSchema::builder("scale")
//!     .option("filter", String::from("bilinear"))
//!     .build();
//!
//! let video = GroupSchema::builder("video")
//!     .option_with_flags("gamma", 1.0_f64, UPDATE_VIDEO)
//!     .sub_group("scale", scale)
//!     .build();
//!
//! assert_eq!(video.option_count(), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::value::{OptionKind, OptionValue};

/// One value option in a schema.
#[derive(Clone)]
pub struct OptionSpec {
    name: String,
    default: Arc<dyn OptionValue>,
    change_flags: u64,
}

impl OptionSpec {
    /// Option name, local to its group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default value.
    pub fn default_value(&self) -> &dyn OptionValue {
        self.default.as_ref()
    }

    /// Kind of the option's values.
    pub fn kind(&self) -> OptionKind {
        self.default.kind()
    }

    /// Flags reported to caches when this option changes.
    pub fn change_flags(&self) -> u64 {
        self.change_flags
    }

    pub(crate) fn shared_default(&self) -> Arc<dyn OptionValue> {
        Arc::clone(&self.default)
    }
}

impl fmt::Debug for OptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionSpec")
            .field("name", &self.name)
            .field("default", &self.default)
            .field("change_flags", &format_args!("{:#x}", self.change_flags))
            .finish()
    }
}

/// An entry of a [`GroupSchema`].
#[derive(Debug, Clone)]
pub enum SchemaEntry {
    /// A value option stored in this group.
    Value(OptionSpec),
    /// A nested group. Its options are named `<prefix>-<name>-<option>`.
    SubGroup {
        /// Entry name, used as name prefix for the sub-group.
        name: String,
        /// The nested group.
        schema: Arc<GroupSchema>,
    },
    /// A list of dynamically-typed sub-objects, each contributing its own
    /// group without inheriting a name prefix.
    ObjectList {
        /// Entry name.
        name: String,
        /// One schema per object type.
        entries: Vec<Arc<GroupSchema>>,
    },
}

/// Static description of one option group.
#[derive(Debug)]
pub struct GroupSchema {
    name: String,
    prefix: Option<String>,
    change_flags: u64,
    entries: Vec<SchemaEntry>,
}

impl GroupSchema {
    /// Start building a group schema.
    pub fn builder(name: impl Into<String>) -> GroupSchemaBuilder {
        GroupSchemaBuilder::new(name)
    }

    /// Group name (diagnostics only).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicit name prefix, replacing the one inherited from the parent.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Flags folded into the change mask of every option in this group and
    /// its descendants, seen from a cache rooted above this group.
    pub fn change_flags(&self) -> u64 {
        self.change_flags
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    /// Value options in declaration order.
    pub fn options(&self) -> impl Iterator<Item = &OptionSpec> {
        self.entries.iter().filter_map(|entry| match entry {
            SchemaEntry::Value(spec) => Some(spec),
            _ => None,
        })
    }

    /// Number of value options declared directly in this group.
    pub fn option_count(&self) -> usize {
        self.options().count()
    }
}

/// Builder for [`GroupSchema`].
#[derive(Debug)]
pub struct GroupSchemaBuilder {
    schema: GroupSchema,
}

impl GroupSchemaBuilder {
    /// Create a builder for a group called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: GroupSchema {
                name: name.into(),
                prefix: None,
                change_flags: 0,
                entries: Vec::new(),
            },
        }
    }

    /// Add a value option with no change flags.
    pub fn option<T: OptionValue>(self, name: impl Into<String>, default: T) -> Self {
        self.option_with_flags(name, default, 0)
    }

    /// Add a value option reporting `change_flags` when it changes.
    ///
    /// # Panics
    ///
    /// Panics if the group already declares an entry with that name.
    pub fn option_with_flags<T: OptionValue>(
        mut self,
        name: impl Into<String>,
        default: T,
        change_flags: u64,
    ) -> Self {
        let name = name.into();
        self.assert_unique(&name);
        self.schema.entries.push(SchemaEntry::Value(OptionSpec {
            name,
            default: Arc::new(default),
            change_flags,
        }));
        self
    }

    /// Add a nested group.
    pub fn sub_group(mut self, name: impl Into<String>, schema: Arc<GroupSchema>) -> Self {
        let name = name.into();
        self.assert_unique(&name);
        self.schema
            .entries
            .push(SchemaEntry::SubGroup { name, schema });
        self
    }

    /// Add a list of dynamically-typed sub-objects.
    pub fn object_list(mut self, name: impl Into<String>, entries: Vec<Arc<GroupSchema>>) -> Self {
        let name = name.into();
        self.assert_unique(&name);
        self.schema
            .entries
            .push(SchemaEntry::ObjectList { name, entries });
        self
    }

    /// Replace the inherited name prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.schema.prefix = Some(prefix.into());
        self
    }

    /// Set group-level change flags.
    pub fn change_flags(mut self, flags: u64) -> Self {
        self.schema.change_flags = flags;
        self
    }

    /// Finish the schema.
    pub fn build(self) -> Arc<GroupSchema> {
        Arc::new(self.schema)
    }

    fn assert_unique(&self, name: &str) {
        let taken = self.schema.entries.iter().any(|entry| match entry {
            SchemaEntry::Value(spec) => spec.name == name,
            SchemaEntry::SubGroup { name: other, .. }
            | SchemaEntry::ObjectList { name: other, .. } => other == name,
        });
        assert!(
            !taken,
            "group '{}' declares '{}' twice",
            self.schema.name, name
        );
    }
}
