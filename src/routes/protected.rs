use crate::models::Role;

/// Admin subtree: user management and every content area.
pub const ADMIN_ROUTES: &[&str] = &[
    "/admin",
    "/admin/users",
    "/admin/users/{id}",
    "/admin/articles",
    "/admin/articles/{id}",
    "/admin/faq",
    "/admin/faq/{id}",
    "/admin/timeline",
    "/admin/timeline/{id}",
    "/admin/gallery",
    "/admin/gallery/{id}",
    "/admin/sponsors",
    "/admin/sponsors/{id}",
    "/admin/schools",
    "/admin/schools/{id}",
    "/admin/matches",
    "/admin/matches/{id}",
];

/// Head writer subtree: own articles plus the review queue for writers' drafts.
pub const HEAD_WRITER_ROUTES: &[&str] = &[
    "/head-writer",
    "/head-writer/articles",
    "/head-writer/articles/{id}",
    "/head-writer/review",
    "/head-writer/review/{id}",
];

/// League operator subtree: fixtures, results and the participating schools.
pub const LEAGUE_OPERATOR_ROUTES: &[&str] = &[
    "/league-operator",
    "/league-operator/matches",
    "/league-operator/matches/{id}",
    "/league-operator/scores",
    "/league-operator/scores/{id}",
    "/league-operator/schools",
];

pub const WRITER_ROUTES: &[&str] = &[
    "/writer",
    "/writer/articles",
    "/writer/articles/{id}",
];

/// Where each role lands after signing in.
pub const DASHBOARDS: &[(Role, &str)] = &[
    (Role::Admin, "/admin"),
    (Role::HeadWriter, "/head-writer"),
    (Role::LeagueOperator, "/league-operator"),
    (Role::Writer, "/writer"),
];

/// role_routes
///
/// The role → subtree table. Access is coarse: a role may open any page in its own
/// subtree and nothing in another role's. The protected route list is the union of
/// these sets.
pub fn role_routes() -> [(Role, &'static [&'static str]); 4] {
    [
        (Role::Admin, ADMIN_ROUTES),
        (Role::HeadWriter, HEAD_WRITER_ROUTES),
        (Role::LeagueOperator, LEAGUE_OPERATOR_ROUTES),
        (Role::Writer, WRITER_ROUTES),
    ]
}
