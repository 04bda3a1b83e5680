#![allow(clippy::unwrap_used, clippy::expect_used)]

use acl_security::constants::{SYSTEM_GROUP_ID, USER_GROUP_ID, is_pseudo_group};
use acl_security::{AccessScope, Details, EventRef, Permissions, SecuredRow, row_properties};

#[test]
fn pseudo_groups_are_system_and_user() {
    assert!(is_pseudo_group(SYSTEM_GROUP_ID));
    assert!(is_pseudo_group(USER_GROUP_ID));
    assert!(!is_pseudo_group(10));
}

#[test]
fn empty_scope_is_deny_all() {
    let scope = AccessScope::default();
    assert!(scope.is_deny_all());
    assert!(!scope.has_property(row_properties::GROUP_ID));
}

#[test]
fn id_scope_matches_listed_rows_only() {
    let details = Details::new(5, 10, Some(Permissions::PRIVATE), EventRef::new(1, "Test"));
    let scope = AccessScope::for_ids([7, 9]);

    assert!(scope.matches(&SecuredRow::new(7, &details)));
    assert!(scope.matches(&SecuredRow::new(9, &details)));
    assert!(!scope.matches(&SecuredRow::new(8, &details)));
}
