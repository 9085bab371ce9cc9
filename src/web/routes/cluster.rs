use super::{Reply, ok, output};
use crate::{
    ops::{asm, rac},
    web::{AppContext, session::CurrentUser},
};
use axum::extract::State;
use serde_json::json;
use std::sync::Arc;

pub async fn nodes(State(app): State<Arc<AppContext>>, _user: CurrentUser) -> Reply {
    let view = app.run("rac_nodes", rac::nodes).await?;
    Ok(ok(json!({ "clustered": view.clustered, "nodes": view.nodes })))
}

pub async fn asm(State(app): State<Arc<AppContext>>, _user: CurrentUser) -> Reply {
    let outcome = app.run("asm_status", asm::status).await?;
    Ok(output(&outcome))
}
