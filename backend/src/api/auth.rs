use crate::error::{PipelineError, PipelineResult};
use crate::models::SessionUser;
use crate::services::auth_service::{STATE_COOKIE, USER_COOKIE};
use crate::AppState;
use log::{info, warn};
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::{get, State};
use serde_json::{json, Value};

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie
}

#[get("/user")]
pub fn get_user(user: Option<SessionUser>) -> Json<Value> {
    match user {
        Some(SessionUser(user)) => Json(user),
        None => Json(json!({})),
    }
}

#[get("/login")]
pub fn login(app: &State<AppState>, cookies: &CookieJar<'_>) -> PipelineResult<Redirect> {
    let csrf_state = uuid::Uuid::new_v4().to_string();
    let url = app.auth.authorize_url(&csrf_state)?;
    cookies.add_private(session_cookie(STATE_COOKIE, csrf_state));
    Ok(Redirect::to(url))
}

#[get("/auth/google/callback?<code>&<state>")]
pub async fn auth_callback(
    app: &State<AppState>,
    cookies: &CookieJar<'_>,
    code: Option<String>,
    state: Option<String>,
) -> PipelineResult<Redirect> {
    let expected = cookies
        .get_private(STATE_COOKIE)
        .map(|cookie| cookie.value().to_string());
    cookies.remove_private(STATE_COOKIE);

    if expected.is_none() || expected != state {
        warn!("OAuth callback with mismatched state");
        return Err(PipelineError::invalid_input("Invalid OAuth state"));
    }
    let Some(code) = code else {
        return Err(PipelineError::invalid_input("Missing authorization code"));
    };

    let user = app.auth.exchange_code(&code).await?;
    let encoded = serde_json::to_string(&user)
        .map_err(|e| PipelineError::internal(format!("Failed to encode session: {e}")))?;
    cookies.add_private(session_cookie(USER_COOKIE, encoded));
    info!("User logged in");

    Ok(Redirect::to("/"))
}

#[get("/logout")]
pub fn logout(cookies: &CookieJar<'_>) -> Redirect {
    cookies.remove_private(USER_COOKIE);
    Redirect::to("/")
}
