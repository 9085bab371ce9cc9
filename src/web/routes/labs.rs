use super::{Reply, ok, started};
use crate::{
    error::Error,
    ops::{
        Outcome,
        labs::{self, LABS},
    },
    validation,
    web::{
        AppContext,
        session::{AdminUser, CurrentUser},
    },
};
use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub async fn list(_user: CurrentUser) -> Reply {
    Ok(ok(json!({ "labs": LABS })))
}

#[derive(Debug, Deserialize)]
pub struct RunLab {
    pub number: String,
}

pub async fn run(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<RunLab>,
) -> Reply {
    let number = validation::lab_number(&form.number)?;
    let record = app.job(
        &format!("lab-{number:02}"),
        app.config.clone(),
        move |ctx, _| labs::run_lab(ctx, number, &[]),
    );
    Ok(started(&record))
}

#[derive(Debug, Deserialize)]
pub struct RunSequence {
    pub from: String,
    pub to: String,
}

pub async fn run_sequence(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<RunSequence>,
) -> Reply {
    let from = validation::lab_number(&form.from)?;
    let to = validation::lab_number(&form.to)?;
    if from > to {
        return Err(Error::invalid(
            "lab range",
            format!("{from:02}-{to:02}"),
            "start must not be after end",
        )
        .into());
    }
    let record = app.job(
        &format!("labs-{from:02}-{to:02}"),
        app.config.clone(),
        move |ctx, _| {
            let summary = labs::run_labs(ctx, from, to, &mut |_, _| false)?;
            match summary.failed.first() {
                Some(number) => Err(Error::PlanFailed {
                    step: format!("Lab {number:02}"),
                }),
                None => Ok(Outcome::new(format!(
                    "Labs {from:02} to {to:02} completed"
                ))),
            }
        },
    );
    Ok(started(&record))
}
