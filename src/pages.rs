use axum::{response::Html, routing::get, Router};

use crate::state::AppState;

// Placeholder pages; the route guard decides who reaches them.
pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| page("Home")))
        .route("/about", get(|| page("About")))
        .route("/contact", get(|| page("Contact")))
        .route("/login", get(|| page("Login")))
        .route("/signup", get(|| page("Sign up")))
        .route("/dashboard", get(|| page("Dashboard")))
        .route("/profile", get(|| page("Profile")))
}

async fn page(title: &'static str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><title>{title} | Notekeep</title></head>\
         <body><h1>{title}</h1></body></html>"
    ))
}
