use serde::Deserialize;
use serde_json::Value;

use super::{payload_object, user_error};
use crate::auth::{self, AdminContext};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    #[serde(alias = "user", alias = "name")]
    username: String,
    #[serde(alias = "pin", alias = "pass")]
    password: String,
}

fn parse_login_payload(arg0: Option<Value>) -> Result<LoginPayload, String> {
    serde_json::from_value(payload_object(arg0))
        .map_err(|e| format!("Invalid login payload: {e}"))
}

pub async fn auth_login(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    let payload = parse_login_payload(arg0)?;
    auth::login(ctx, &payload.username, payload.password)
        .await
        .map_err(user_error)
}

pub async fn auth_logout(ctx: &AdminContext) -> Result<Value, String> {
    auth::logout(ctx).map_err(user_error)
}

pub async fn auth_get_current_session(ctx: &AdminContext) -> Result<Value, String> {
    Ok(auth::session_info(ctx))
}
