/// Public Route Table
///
/// Pages and endpoints reachable without a session. None of these may overlap a
/// protected pattern; `RouteClassifier::new` rejects the tables at startup if they do.
///
/// `/login` is listed here, but a logged-in visitor never sees it: the redirect policy
/// sends them to their dashboard first.
pub const PUBLIC_ROUTES: &[&str] = &[
    // --- Landing & gateway pages ---
    "/",
    "/login",
    "/no-access",
    "/not-found",
    "/auth/callback",
    // --- Published content ---
    "/articles",
    "/articles/{slug}",
    "/faq",
    "/timeline",
    "/gallery",
    "/gallery/{album}",
    "/sponsors",
    "/schools",
    "/schools/{id}",
    "/matches",
    "/matches/{id}",
    "/scores",
    // --- Service endpoints ---
    "/health",
    "/api/auth/login",
    "/api/auth/logout",
    "/api-docs/openapi.json",
];
