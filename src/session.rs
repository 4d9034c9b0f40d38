#![cfg(feature = "web")]
//! Acting-user selection, kept in a cookie so audit rows carry a name

use axum::{
    Form,
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::info;
use serde::Deserialize;

use crate::config::{DEVELOPERS, Settings};

/// Cookie holding the name picked in the sidebar
pub const USER_COOKIE: &str = "tracker_user";

/// Form data of the user picker
#[derive(Debug, Deserialize)]
pub struct UserChoice {
    pub user: String,

    /// Page to return to after the cookie is set
    #[serde(default)]
    pub back: Option<String>,
}

/// Name to record for the current request.
///
/// A cookie value outside the roster is ignored; without a cookie the
/// configured or OS user name is used.
pub fn current_user(jar: &CookieJar, settings: &Settings) -> String {
    jar.get(USER_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|name| DEVELOPERS.contains(&name.as_str()))
        .unwrap_or_else(|| settings.acting_user())
}

/// Handle the user picker
///
/// # Arguments
/// * `jar` - Cookie jar to store the choice in
/// * `choice` - Form with the picked name and the page to go back to
///
/// # Returns
/// * Modified cookie jar and a redirect to the previous page
pub async fn handle_choose_user(jar: CookieJar, Form(choice): Form<UserChoice>) -> impl IntoResponse {
    let back = choice
        .back
        .filter(|b| is_local_path(b))
        .unwrap_or_else(|| "/".to_string());

    if !DEVELOPERS.contains(&choice.user.as_str()) {
        let target = with_flash(&back, "error", &format!("Unknown user: {}", choice.user));
        return (jar, Redirect::to(&target));
    }

    info!("Acting user set to {}", choice.user);
    let mut cookie = Cookie::new(USER_COOKIE, choice.user);
    cookie.set_path("/");
    (jar.add(cookie), Redirect::to(&back))
}

/// Whether `path` stays on this site; `//host` and `/\host` are read as
/// protocol-relative by browsers
pub fn is_local_path(path: &str) -> bool {
    let mut chars = path.chars();
    chars.next() == Some('/') && !matches!(chars.next(), Some('/') | Some('\\'))
}

/// Append a flash message to a local path, keeping its existing query
pub fn with_flash(path: &str, kind: &str, message: &str) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", path, separator, kind, urlencoding::encode(message))
}
