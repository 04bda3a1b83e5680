use std::fmt;

/// A scalar value for scope filtering.
///
/// Used in [`ScopeFilter`] predicates to represent typed values. The same
/// value type is produced by [`ScopeRow::property`] so in-memory evaluation
/// and SQL compilation see identical data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScopeValue {
    /// Integer value (object ids, user ids, group ids, permission bits).
    Int(i64),
    /// String value (type names, external tags).
    String(String),
    /// Boolean value.
    Bool(bool),
}

impl ScopeValue {
    /// Try to extract an integer from this value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::String(_) | Self::Bool(_) => None,
        }
    }
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<i64> for ScopeValue {
    #[inline]
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<String> for ScopeValue {
    #[inline]
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for ScopeValue {
    #[inline]
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<bool> for ScopeValue {
    #[inline]
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Well-known row property names.
///
/// Shared between the filters that build predicates, the in-memory
/// evaluator ([`ScopeRow`]) and the ORM condition builder
/// (`SecuredEntity::resolve_property()`), so there is a single source of
/// truth for property names.
pub mod row_properties {
    /// Row identity. Typically maps to the primary key column.
    pub const ID: &str = "id";

    /// Owning user. Maps to the `owner_id` column.
    pub const OWNER_ID: &str = "owner_id";

    /// Owning group. Maps to the `group_id` column.
    pub const GROUP_ID: &str = "group_id";

    /// Permission bit set stored as an integer. Maps to the `permissions` column.
    pub const PERMISSIONS: &str = "permissions";
}

/// Read access to the properties of one row.
///
/// Returning `None` models SQL `NULL`: every filter on an absent property
/// evaluates to false, exactly like the compiled condition would.
pub trait ScopeRow {
    fn property(&self, name: &str) -> Option<ScopeValue>;
}

/// A single scope filter: a typed predicate on a named row property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeFilter {
    /// Equality: `property = value`.
    Eq(EqScopeFilter),
    /// Set membership: `property IN (values)`.
    In(InScopeFilter),
    /// Bit test: `(property & mask) = mask`.
    HasBits(BitsScopeFilter),
}

/// Equality scope filter: `property = value`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EqScopeFilter {
    property: String,
    value: ScopeValue,
}

/// Set membership scope filter: `property IN (values)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InScopeFilter {
    property: String,
    values: Vec<ScopeValue>,
}

/// Bit test scope filter: every bit of `mask` must be set in `property`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BitsScopeFilter {
    property: String,
    mask: i64,
}

impl EqScopeFilter {
    #[must_use]
    pub fn new(property: impl Into<String>, value: impl Into<ScopeValue>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    #[inline]
    #[must_use]
    pub fn value(&self) -> &ScopeValue {
        &self.value
    }
}

impl InScopeFilter {
    #[must_use]
    pub fn new(property: impl Into<String>, values: Vec<ScopeValue>) -> Self {
        Self {
            property: property.into(),
            values,
        }
    }

    /// Create from an iterator of convertible values.
    #[must_use]
    pub fn from_values<V: Into<ScopeValue>>(
        property: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            property: property.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    #[inline]
    #[must_use]
    pub fn values(&self) -> &[ScopeValue] {
        &self.values
    }
}

impl BitsScopeFilter {
    #[must_use]
    pub fn new(property: impl Into<String>, mask: i64) -> Self {
        Self {
            property: property.into(),
            mask,
        }
    }

    #[inline]
    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    #[inline]
    #[must_use]
    pub fn mask(&self) -> i64 {
        self.mask
    }
}

impl ScopeFilter {
    /// Create an equality filter (`property = value`).
    #[must_use]
    pub fn eq(property: impl Into<String>, value: impl Into<ScopeValue>) -> Self {
        Self::Eq(EqScopeFilter::new(property, value))
    }

    /// Create a set membership filter (`property IN (values)`).
    #[must_use]
    pub fn r#in(property: impl Into<String>, values: Vec<ScopeValue>) -> Self {
        Self::In(InScopeFilter::new(property, values))
    }

    /// Create a set membership filter from integer ids (convenience).
    #[must_use]
    pub fn in_ids(property: impl Into<String>, ids: impl IntoIterator<Item = i64>) -> Self {
        Self::In(InScopeFilter::from_values(property, ids))
    }

    /// Create a bit test filter (`(property & mask) = mask`).
    #[must_use]
    pub fn has_bits(property: impl Into<String>, mask: i64) -> Self {
        Self::HasBits(BitsScopeFilter::new(property, mask))
    }

    /// The row property name.
    #[must_use]
    pub fn property(&self) -> &str {
        match self {
            Self::Eq(f) => f.property(),
            Self::In(f) => f.property(),
            Self::HasBits(f) => f.property(),
        }
    }

    /// Evaluate this filter against a row.
    #[must_use]
    pub fn matches(&self, row: &dyn ScopeRow) -> bool {
        let Some(actual) = row.property(self.property()) else {
            return false;
        };
        match self {
            Self::Eq(f) => &actual == f.value(),
            Self::In(f) => f.values().contains(&actual),
            Self::HasBits(f) => actual
                .as_int()
                .is_some_and(|bits| bits & f.mask() == f.mask()),
        }
    }
}

/// A conjunction (AND) of scope filters, one access path.
///
/// An empty constraint matches every row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeConstraint {
    filters: Vec<ScopeFilter>,
}

impl ScopeConstraint {
    #[must_use]
    pub fn new(filters: Vec<ScopeFilter>) -> Self {
        Self { filters }
    }

    /// The filters in this constraint (AND-ed together).
    #[inline]
    #[must_use]
    pub fn filters(&self) -> &[ScopeFilter] {
        &self.filters
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    #[must_use]
    pub fn matches(&self, row: &dyn ScopeRow) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

/// A disjunction (OR) of scope constraints defining which rows are visible.
///
/// Each constraint is an independent access path (OR-ed). Filters within a
/// constraint are AND-ed. An unconstrained scope bypasses row-level
/// filtering; a scope with no constraints denies everything.
///
/// # Examples
///
/// ```
/// use acl_security::access_scope::{AccessScope, ScopeConstraint, ScopeFilter, row_properties};
///
/// let scope = AccessScope::deny_all();
/// assert!(scope.is_deny_all());
///
/// let scope = AccessScope::single(ScopeConstraint::new(vec![ScopeFilter::eq(
///     row_properties::GROUP_ID,
///     10_i64,
/// )]));
/// assert!(scope.has_property(row_properties::GROUP_ID));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessScope {
    constraints: Vec<ScopeConstraint>,
    unconstrained: bool,
}

impl Default for AccessScope {
    /// Default is deny-all: no constraints and not unconstrained.
    fn default() -> Self {
        Self::deny_all()
    }
}

impl AccessScope {
    // ── Constructors ────────────────────────────────────────────────

    /// Create an access scope from a list of constraints (OR-ed).
    ///
    /// An empty constraint in the list makes the whole scope unconstrained.
    #[must_use]
    pub fn from_constraints(constraints: Vec<ScopeConstraint>) -> Self {
        if constraints.iter().any(ScopeConstraint::is_empty) {
            return Self::allow_all();
        }
        Self {
            constraints,
            unconstrained: false,
        }
    }

    #[must_use]
    pub fn single(constraint: ScopeConstraint) -> Self {
        Self::from_constraints(vec![constraint])
    }

    /// Create an "allow all" (unconstrained) scope.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            constraints: Vec::new(),
            unconstrained: true,
        }
    }

    /// Create a "deny all" scope (no access).
    #[must_use]
    pub fn deny_all() -> Self {
        Self {
            constraints: Vec::new(),
            unconstrained: false,
        }
    }

    /// `allow_all()` when `allowed`, `deny_all()` otherwise.
    #[must_use]
    pub fn from_bool(allowed: bool) -> Self {
        if allowed {
            Self::allow_all()
        } else {
            Self::deny_all()
        }
    }

    /// Create a scope for a set of row ids.
    #[must_use]
    pub fn for_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        Self::single(ScopeConstraint::new(vec![ScopeFilter::in_ids(
            row_properties::ID,
            ids,
        )]))
    }

    // ── Combinators ─────────────────────────────────────────────────

    /// Rows visible through `self` AND through `other`.
    ///
    /// `(A1 | A2) & (B1 | B2)` is distributed into `A1&B1 | A1&B2 | A2&B1 | A2&B2`
    /// so the result stays in OR-of-AND form.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        if self.is_deny_all() || other.is_deny_all() {
            return Self::deny_all();
        }
        if self.unconstrained {
            return other;
        }
        if other.unconstrained {
            return self;
        }
        let mut constraints = Vec::with_capacity(self.constraints.len() * other.constraints.len());
        for left in &self.constraints {
            for right in &other.constraints {
                let mut filters = left.filters.clone();
                filters.extend(right.filters.iter().cloned());
                constraints.push(ScopeConstraint::new(filters));
            }
        }
        Self::from_constraints(constraints)
    }

    /// Rows visible through `self` OR through `other`.
    #[must_use]
    pub fn union(mut self, other: Self) -> Self {
        if self.unconstrained || other.unconstrained {
            return Self::allow_all();
        }
        self.constraints.extend(other.constraints);
        self
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// The constraints in this scope (OR-ed).
    #[inline]
    #[must_use]
    pub fn constraints(&self) -> &[ScopeConstraint] {
        &self.constraints
    }

    #[inline]
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.unconstrained
    }

    /// A scope is deny-all when it is not unconstrained and has no constraints.
    #[must_use]
    pub fn is_deny_all(&self) -> bool {
        !self.unconstrained && self.constraints.is_empty()
    }

    /// Check if any constraint references the given property.
    #[must_use]
    pub fn has_property(&self, property: &str) -> bool {
        self.constraints
            .iter()
            .any(|c| c.filters().iter().any(|f| f.property() == property))
    }

    /// Evaluate the scope against a single row.
    ///
    /// This is the truth value the compiled SQL condition has for the same
    /// row; filters use it as the oracle for their procedural checks.
    #[must_use]
    pub fn matches(&self, row: &dyn ScopeRow) -> bool {
        self.unconstrained || self.constraints.iter().any(|c| c.matches(row))
    }
}
