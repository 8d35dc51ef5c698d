use crate::{
    models::Role,
    routes::{RouteClassifier, normalize},
};

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const NO_ACCESS_PATH: &str = "/no-access";
pub const NOT_FOUND_PATH: &str = "/not-found";

/// decide
///
/// Computes the canonical destination for a request. Returns `path` itself when no
/// redirect is needed. Pure: the answer depends only on the arguments and the static
/// route tables.
///
/// Rules, first match wins:
/// 1. an authenticated visit to `/login` goes to the role's dashboard (or `/` without one);
/// 2. `/` always stays on `/`, logged in or not;
/// 3. a path matching no route goes to `/not-found`;
/// 4. anything else stays where it is.
///
/// Rules 1 and 2 compare the path with empty segments collapsed, so `/login/` counts as
/// `/login`.
///
/// Rule 1 must run before rule 3: `/login` is a known public route, yet an authenticated
/// caller must still be moved off it.
pub fn decide(
    routes: &RouteClassifier,
    path: &str,
    role: Option<Role>,
    authenticated: bool,
) -> String {
    let normalized = normalize(path);

    if normalized == LOGIN_PATH && authenticated {
        return routes.dashboard(role).unwrap_or(HOME_PATH).to_string();
    }

    if normalized == HOME_PATH {
        return HOME_PATH.to_string();
    }

    if !routes.is_known(path) {
        return NOT_FOUND_PATH.to_string();
    }

    path.to_string()
}
