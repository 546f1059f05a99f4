//! HTML shells for the page routes. The client bundle renders the content;
//! the server only decides whether the shell is reachable.

use axum::{
    extract::{Extension, OriginalUri},
    response::Html,
    routing::get,
    Router,
};

use crate::{auth::Identity, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/login", get(login))
        .route("/register", get(register))
        .route("/unauthorized", get(unauthorized))
        .route("/admin", get(admin))
        .route("/admin/*rest", get(admin))
}

fn shell(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{title}</title>\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"></head>\n\
         <body>{body}<script type=\"module\" src=\"/assets/app.js\"></script></body>\n</html>\n"
    ))
}

async fn home() -> Html<String> {
    shell("Portfolio", "<main id=\"app\" data-page=\"home\"></main>")
}

async fn login() -> Html<String> {
    shell("Sign in", "<main id=\"app\" data-page=\"login\"></main>")
}

async fn register() -> Html<String> {
    shell("Create account", "<main id=\"app\" data-page=\"register\"></main>")
}

async fn unauthorized() -> Html<String> {
    shell(
        "Unauthorized",
        "<main id=\"app\" data-page=\"unauthorized\"><h1>Admin access required</h1></main>",
    )
}

/// Reached only through the session gate, which attaches the identity.
async fn admin(identity: Option<Extension<Identity>>, OriginalUri(uri): OriginalUri) -> Html<String> {
    let attrs = match identity {
        Some(Extension(id)) => format!(
            " data-user-id=\"{}\" data-user-role=\"{}\"",
            id.user_id,
            id.role.as_str()
        ),
        None => String::new(),
    };
    shell(
        "Admin",
        &format!(
            "<main id=\"app\" data-page=\"admin\" data-path=\"{}\"{attrs}></main>",
            escape_attr(uri.path())
        ),
    )
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_values_are_escaped() {
        assert_eq!(escape_attr("/admin/\"x\"<y>&"), "/admin/&quot;x&quot;&lt;y&gt;&amp;");
    }
}
