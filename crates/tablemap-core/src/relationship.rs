//! Relation metadata for tablemap.
//!
//! Relations are declared on the owning type (via the derive macro) and
//! represented as static metadata in its `Table`. The mapping engine uses them
//! to resolve dotted join paths and to find where a related value lives inside
//! the owning struct.

use std::any::Any;
use std::fmt;

use crate::table::Table;

/// The kind of a relation between two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// `User` has one `Profile`; the profile holds the foreign key.
    HasOne,
    /// `Profile` belongs to one `User`; the profile holds the foreign key.
    BelongsTo,
    /// `User` has many `Post`s.
    HasMany,
    /// `Order`s have many `Item`s via a link table.
    ManyToMany,
}

impl RelationKind {
    /// Whether the related value lives inline in the owning struct.
    ///
    /// Inline relations are mounted while the owner's row is scanned; the others
    /// accumulate a sequence from a separate result set.
    #[must_use]
    pub const fn is_inline(self) -> bool {
        matches!(self, RelationKind::HasOne | RelationKind::BelongsTo)
    }

    /// Parse the attribute spelling (`"has-one"`, `"belongs-to"`, ...).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "has-one" => Some(RelationKind::HasOne),
            "belongs-to" => Some(RelationKind::BelongsTo),
            "has-many" => Some(RelationKind::HasMany),
            "many-to-many" | "m2m" => Some(RelationKind::ManyToMany),
            _ => None,
        }
    }

    /// The attribute spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RelationKind::HasOne => "has-one",
            RelationKind::BelongsTo => "belongs-to",
            RelationKind::HasMany => "has-many",
            RelationKind::ManyToMany => "many-to-many",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information about a link table for many-to-many relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTable {
    /// The link table name (e.g., `"order_items"`).
    pub table_name: &'static str,

    /// Column in the link table pointing to the owning model (e.g., `"order_id"`).
    pub local_column: &'static str,

    /// Column in the link table pointing to the related model (e.g., `"item_id"`).
    pub remote_column: &'static str,
}

impl LinkTable {
    /// Create a new link-table definition.
    #[must_use]
    pub const fn new(
        table_name: &'static str,
        local_column: &'static str,
        remote_column: &'static str,
    ) -> Self {
        Self {
            table_name,
            local_column,
            remote_column,
        }
    }
}

/// Locates (and with `alloc`, allocates) an inline related value inside its owner.
///
/// Returns `None` when the storage is absent and `alloc` is false.
pub type MountFn = fn(&mut dyn Any, bool) -> Option<&mut dyn Any>;

/// Moves a freshly scanned related value into its owner's sequence.
///
/// Gives the value back when it is not of the sequence's element type.
pub type PushFn = fn(&mut dyn Any, Box<dyn Any>) -> Result<(), Box<dyn Any>>;

/// Lists the values already held in an owner's sequence.
pub type ItemsFn = fn(&mut dyn Any) -> Vec<&mut dyn Any>;

/// Where a related value lives inside the owning struct.
#[derive(Clone, Copy)]
pub enum RelationSlot {
    /// One inline value (`T`, `Box<T>`, `Option<T>`, `Option<Box<T>>`).
    One(MountFn),
    /// A sequence of values (`Vec<T>`).
    Many(PushFn, ItemsFn),
}

impl fmt::Debug for RelationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationSlot::One(_) => f.write_str("One"),
            RelationSlot::Many(..) => f.write_str("Many"),
        }
    }
}

/// Metadata about one declared relation.
#[derive(Debug, Clone)]
pub struct Relation {
    /// Rust field name; the first thing a join path segment is matched against.
    pub name: &'static str,
    /// Column prefix used in `alias__column` result names.
    pub alias: &'static str,
    /// Kind of relation.
    pub kind: RelationKind,
    /// Position of this relation in the owning table's relation list.
    pub index: usize,
    /// `(base_column, join_column)` pairs; for many-to-many the join side names
    /// the link table's local column.
    pub join_keys: &'static [(&'static str, &'static str)],
    /// Link table for many-to-many relations.
    pub link_table: Option<LinkTable>,
    target: fn() -> &'static Table,
    slot: RelationSlot,
}

impl Relation {
    /// Create a relation; `alias` defaults to `name`.
    ///
    /// The target table is resolved lazily, so two entities may reference each
    /// other.
    pub const fn new(
        name: &'static str,
        kind: RelationKind,
        target: fn() -> &'static Table,
        slot: RelationSlot,
    ) -> Self {
        Self {
            name,
            alias: name,
            kind,
            index: 0,
            join_keys: &[],
            link_table: None,
            target,
            slot,
        }
    }

    /// Set the column prefix.
    #[must_use]
    pub const fn alias(mut self, alias: &'static str) -> Self {
        self.alias = alias;
        self
    }

    /// Set the join-key column pairs.
    #[must_use]
    pub const fn join_keys(mut self, keys: &'static [(&'static str, &'static str)]) -> Self {
        self.join_keys = keys;
        self
    }

    /// Set the link table metadata (many-to-many).
    #[must_use]
    pub const fn link_table(mut self, info: LinkTable) -> Self {
        self.link_table = Some(info);
        self
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// The related table.
    pub fn target(&self) -> &'static Table {
        (self.target)()
    }

    /// Where the related value lives.
    pub const fn slot(&self) -> RelationSlot {
        self.slot
    }

    /// Whether the related value is mounted inline while scanning the owner.
    pub const fn is_inline(&self) -> bool {
        self.kind.is_inline()
    }

    /// True when `name` is this relation's field name or alias.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.alias == name
    }

    /// Base-side key columns.
    pub fn base_columns(&self) -> impl Iterator<Item = &'static str> {
        self.join_keys.iter().map(|(base, _)| *base)
    }

    /// Result-set columns that carry the join key of each related row.
    ///
    /// For has-many this is the join column itself; for many-to-many it is the
    /// link table's local column, selected as `link_table__local_column`.
    pub fn key_columns(&self) -> Vec<String> {
        match (self.kind, self.link_table) {
            (RelationKind::ManyToMany, Some(link)) => {
                vec![format!("{}__{}", link.table_name, link.local_column)]
            }
            _ => self
                .join_keys
                .iter()
                .map(|(_, join)| (*join).to_string())
                .collect(),
        }
    }

    /// Locate the related value inside `owner`.
    pub fn mount<'a>(&self, owner: &'a mut dyn Any, alloc: bool) -> Option<&'a mut dyn Any> {
        match self.slot {
            RelationSlot::One(mount) => mount(owner, alloc),
            RelationSlot::Many(..) => None,
        }
    }

    /// Every related value currently stored in `owner`: the mounted value of
    /// an inline relation, or each element of a sequence. Never allocates.
    pub fn items<'a>(&self, owner: &'a mut dyn Any) -> Vec<&'a mut dyn Any> {
        match self.slot {
            RelationSlot::One(mount) => mount(owner, false).into_iter().collect(),
            RelationSlot::Many(_, items) => items(owner),
        }
    }
}

/// Mount body for an `Option<Box<T>>` field.
pub fn mount_optional_box<E: Any, T: Any + Default>(
    owner: &mut dyn Any,
    alloc: bool,
    project: fn(&mut E) -> &mut Option<Box<T>>,
) -> Option<&mut dyn Any> {
    let slot = project(owner.downcast_mut::<E>()?);
    if slot.is_none() {
        if !alloc {
            return None;
        }
        *slot = Some(Box::default());
    }
    slot.as_deref_mut().map(|v| v as &mut dyn Any)
}

/// Mount body for an `Option<T>` field.
pub fn mount_optional<E: Any, T: Any + Default>(
    owner: &mut dyn Any,
    alloc: bool,
    project: fn(&mut E) -> &mut Option<T>,
) -> Option<&mut dyn Any> {
    let slot = project(owner.downcast_mut::<E>()?);
    if slot.is_none() && !alloc {
        return None;
    }
    Some(slot.get_or_insert_with(T::default) as &mut dyn Any)
}

/// Mount body for a `Box<T>` field, which is always present.
pub fn mount_boxed<E: Any, T: Any>(
    owner: &mut dyn Any,
    _alloc: bool,
    project: fn(&mut E) -> &mut Box<T>,
) -> Option<&mut dyn Any> {
    let slot = project(owner.downcast_mut::<E>()?);
    Some(slot.as_mut() as &mut dyn Any)
}

/// Mount body for a plain `T` field, which is always present.
pub fn mount_inline<E: Any, T: Any>(
    owner: &mut dyn Any,
    _alloc: bool,
    project: fn(&mut E) -> &mut T,
) -> Option<&mut dyn Any> {
    let slot = project(owner.downcast_mut::<E>()?);
    Some(slot as &mut dyn Any)
}

/// Push body for a `Vec<T>` field.
pub fn push_vec<E: Any, T: Any>(
    owner: &mut dyn Any,
    value: Box<dyn Any>,
    project: fn(&mut E) -> &mut Vec<T>,
) -> Result<(), Box<dyn Any>> {
    let Some(entity) = owner.downcast_mut::<E>() else {
        return Err(value);
    };
    let value = value.downcast::<T>()?;
    project(entity).push(*value);
    Ok(())
}

/// Items body for a `Vec<T>` field.
pub fn vec_items<E: Any, T: Any>(
    owner: &mut dyn Any,
    project: fn(&mut E) -> &mut Vec<T>,
) -> Vec<&mut dyn Any> {
    match owner.downcast_mut::<E>() {
        Some(entity) => project(entity)
            .iter_mut()
            .map(|value| value as &mut dyn Any)
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Profile {
        lang: String,
    }

    #[derive(Default)]
    struct User {
        profile: Option<Box<Profile>>,
        settings: Option<Profile>,
        inline: Profile,
        posts: Vec<Profile>,
    }

    #[test]
    fn test_relation_kind_inline() {
        assert!(RelationKind::HasOne.is_inline());
        assert!(RelationKind::BelongsTo.is_inline());
        assert!(!RelationKind::HasMany.is_inline());
        assert!(!RelationKind::ManyToMany.is_inline());
        assert_eq!(RelationKind::from_name("m2m"), Some(RelationKind::ManyToMany));
        assert_eq!(RelationKind::from_name("has-some"), None);
    }

    #[test]
    fn test_mount_optional_box_allocates_only_on_demand() {
        let mut user = User::default();
        assert!(mount_optional_box::<User, Profile>(&mut user, false, |u| &mut u.profile).is_none());
        assert!(user.profile.is_none());

        let target = mount_optional_box::<User, Profile>(&mut user, true, |u| &mut u.profile).unwrap();
        target.downcast_mut::<Profile>().unwrap().lang = "en".to_string();
        assert_eq!(user.profile.as_ref().map(|p| p.lang.as_str()), Some("en"));

        // Existing storage is reused, not replaced.
        assert!(mount_optional_box::<User, Profile>(&mut user, false, |u| &mut u.profile).is_some());
        assert_eq!(user.profile.unwrap().lang, "en");
    }

    #[test]
    fn test_mount_optional_and_inline() {
        let mut user = User::default();
        assert!(mount_optional::<User, Profile>(&mut user, false, |u| &mut u.settings).is_none());
        assert!(mount_optional::<User, Profile>(&mut user, true, |u| &mut u.settings).is_some());
        assert!(user.settings.is_some());
        assert!(mount_inline::<User, Profile>(&mut user, false, |u| &mut u.inline).is_some());
    }

    #[test]
    fn test_push_vec_checks_element_type() {
        let mut user = User::default();
        push_vec::<User, Profile>(&mut user, Box::new(Profile::default()), |u| &mut u.posts).unwrap();
        assert_eq!(user.posts.len(), 1);
        assert!(push_vec::<User, Profile>(&mut user, Box::new(3_u8), |u| &mut u.posts).is_err());
        assert_eq!(user.posts.len(), 1);

        let items = vec_items::<User, Profile>(&mut user, |u| &mut u.posts);
        assert_eq!(items.len(), 1);
        assert!(items[0].downcast_ref::<Profile>().is_some());
        assert!(vec_items::<User, Profile>(&mut 3_u8, |u| &mut u.posts).is_empty());
    }

    #[test]
    fn test_link_table_info_new() {
        let link = LinkTable::new("order_items", "order_id", "item_id");
        assert_eq!(link.table_name, "order_items");
        assert_eq!(link.local_column, "order_id");
        assert_eq!(link.remote_column, "item_id");
    }
}
