use sea_orm::EntityTrait;

/// Maps the row properties used by visibility predicates onto the columns of
/// a governed table.
///
/// Every governed table stores its security metadata in four columns: the
/// row id, the owning user, the owning group and the permission bits. Tables
/// that keep them under different names implement [`resolve_property`]
/// accordingly.
///
/// # Example
/// ```rust,ignore
/// impl SecuredEntity for image::Entity {
///     fn id_col() -> Self::Column {
///         image::Column::Id
///     }
///     fn owner_col() -> Self::Column {
///         image::Column::OwnerId
///     }
///     fn group_col() -> Self::Column {
///         image::Column::GroupId
///     }
///     fn permissions_col() -> Self::Column {
///         image::Column::Permissions
///     }
/// }
/// ```
///
/// [`resolve_property`]: SecuredEntity::resolve_property
pub trait SecuredEntity: EntityTrait {
    /// Primary key column.
    fn id_col() -> Self::Column;

    /// Column holding the owning user id.
    fn owner_col() -> Self::Column;

    /// Column holding the owning group id.
    fn group_col() -> Self::Column;

    /// Column holding the permission bits as an integer. `NULL` for rows
    /// without a policy.
    fn permissions_col() -> Self::Column;

    /// Resolve a row property name to a column.
    ///
    /// Unknown properties return `None`, which makes the condition builder
    /// fail the enclosing constraint (fail-closed).
    #[must_use]
    fn resolve_property(property: &str) -> Option<Self::Column> {
        use acl_security::row_properties as props;
        match property {
            props::ID => Some(Self::id_col()),
            props::OWNER_ID => Some(Self::owner_col()),
            props::GROUP_ID => Some(Self::group_col()),
            props::PERMISSIONS => Some(Self::permissions_col()),
            _ => None,
        }
    }
}
