//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use openapi_server::models::{
    DeployRequest, DeploymentResponse, DeploymentStatusResponse, EmptyEnvelope, Envelope,
    HealthResponse, SelectRequest, VersionResponse,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::deploy::fsm::DeploymentState;
use crate::errors::AppError;
use crate::models::catalog::{catalog, Catalog, PredefinedMachine};
use crate::models::deployment::DeploymentResult;
use crate::models::machine::{MachineConfiguration, MachineUpdate, NewMachine, Region};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "vmcanvas".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ================================= MACHINES ===================================== //

/// Optional filters for the machine listing
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<DeploymentState>,
    pub region: Option<Region>,
}

pub async fn list_machines_handler(
    State(state): State<Arc<ServerState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Envelope<Vec<MachineConfiguration>>>, AppError> {
    let Query(query) = query?;
    let machines = match (query.status, query.region) {
        (None, None) => state.store.list().await?,
        (Some(status), None) => state.store.list_by_status(status).await?,
        (None, Some(region)) => state.store.list_by_region(region).await?,
        (Some(status), Some(region)) => {
            let mut machines = state.store.list_by_status(status).await?;
            machines.retain(|m| m.region == region);
            machines
        }
    };
    Ok(Json(Envelope::ok(machines)))
}

pub async fn create_machine_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<NewMachine>, JsonRejection>,
) -> Result<Json<Envelope<MachineConfiguration>>, AppError> {
    let Json(record) = payload?;
    let machine = state.store.create(record).await?;
    Ok(Json(Envelope::ok(machine)))
}

pub async fn get_machine_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<MachineConfiguration>>, AppError> {
    let machine = state
        .store
        .get(&id)
        .await?
        .ok_or(AppError::NotFound(id))?;
    Ok(Json(Envelope::ok(machine)))
}

pub async fn update_machine_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    payload: Result<Json<MachineUpdate>, JsonRejection>,
) -> Result<Json<Envelope<MachineConfiguration>>, AppError> {
    let Json(update) = payload?;
    let machine = state
        .store
        .update(&id, update)
        .await?
        .ok_or(AppError::NotFound(id))?;
    Ok(Json(Envelope::ok(machine)))
}

pub async fn delete_machine_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<EmptyEnvelope>, AppError> {
    if !state.store.delete(&id).await? {
        return Err(AppError::NotFound(id));
    }
    state.orchestrator.forget(&id).await;
    Ok(Json(EmptyEnvelope {
        success: true,
        data: None,
        error: None,
    }))
}

// ================================ DEPLOYMENTS =================================== //

/// Deploy one machine and wait for the outcome.
///
/// A stored record's status wins over the one in the request, so a client
/// cannot redeploy a deployed machine by sending a stale copy.
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<DeployRequest<MachineConfiguration>>, JsonRejection>,
) -> Result<(StatusCode, Json<DeploymentResponse>), AppError> {
    let Json(DeployRequest { vm_config: mut config }) = payload?;
    if config.id.trim().is_empty() || config.name.trim().is_empty() {
        return Err(AppError::ValidationError(
            "vmConfig requires a non-empty id and name".to_string(),
        ));
    }

    let stored = state.store.get(&config.id).await?;
    if let Some(stored) = &stored {
        config.deployment_status = stored.deployment_status;
    }
    if config.deployment_status == DeploymentState::Deployed {
        return Err(AppError::AlreadyDeployed(config.id));
    }

    // A refused attempt must not touch the stored record
    let attempt = state.orchestrator.begin(&config).await?;
    if stored.is_some() {
        state.store.mark_deploying(&config.id).await?;
    }
    let result = attempt.run().await?;

    let mut unsaved = None;
    if stored.is_some() {
        if let Err(e) = record_outcome(&state, &config.id, &result).await {
            error!("Failed to record deployment of machine {}: {}", config.id, e);
            unsaved = Some(UNSAVED_OUTCOME_WARNING);
        }
    }

    let status = if result.is_success() {
        info!("Deploy request for machine {} succeeded", config.id);
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let mut response = result.into_response(config.id);
    if let Some(warning) = unsaved {
        response.warning = Some(match response.warning.take() {
            Some(previous) => format!("{}; {}", previous, warning),
            None => warning.to_string(),
        });
    }
    Ok((status, Json(response)))
}

const UNSAVED_OUTCOME_WARNING: &str =
    "The deployment outcome could not be saved; the stored machine may show a stale status";

/// Write the outcome to the store, retrying once
async fn record_outcome(
    state: &ServerState,
    id: &str,
    result: &DeploymentResult,
) -> Result<(), AppError> {
    if let Err(e) = state.store.record_deployment(id, result).await {
        warn!("Recording deployment of machine {} failed, retrying: {}", id, e);
        state.store.record_deployment(id, result).await?;
    }
    Ok(())
}

pub async fn deployment_status_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<DeploymentStatusResponse>>, AppError> {
    if let Some(status) = state.orchestrator.status(&id).await {
        return Ok(Json(Envelope::ok(DeploymentStatusResponse {
            machine_id: id,
            status: status.state.to_string(),
            in_flight: status.in_flight,
            error: status.error,
        })));
    }

    let machine = state
        .store
        .get(&id)
        .await?
        .ok_or(AppError::NotFound(id))?;
    Ok(Json(Envelope::ok(DeploymentStatusResponse {
        machine_id: machine.id,
        status: machine.deployment_status.to_string(),
        in_flight: false,
        error: None,
    })))
}

/// Return a failed machine to `pending`, in the orchestrator and in the store
pub async fn reset_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<DeploymentStatusResponse>>, AppError> {
    let tracked = match state.orchestrator.reset(&id).await {
        Ok(_) => true,
        Err(AppError::NotFound(_)) => false,
        Err(e) => return Err(e),
    };

    let stored = state.store.get(&id).await?;
    match &stored {
        Some(machine) if machine.deployment_status == DeploymentState::Failed => {
            let update = MachineUpdate {
                deployment_status: Some(DeploymentState::Pending),
                ..Default::default()
            };
            state.store.update(&id, update).await?;
        }
        Some(machine) if !tracked => {
            return Err(AppError::ValidationError(format!(
                "Cannot reset machine in state {}",
                machine.deployment_status
            )));
        }
        Some(_) => {}
        None if !tracked => return Err(AppError::NotFound(id)),
        None => {}
    }

    info!("Reset deployment state of machine {}", id);
    Ok(Json(Envelope::ok(DeploymentStatusResponse {
        machine_id: id,
        status: DeploymentState::Pending.to_string(),
        in_flight: false,
        error: None,
    })))
}

// ============================ CATALOG & SELECTION =============================== //

pub async fn catalog_handler() -> Json<Envelope<Catalog>> {
    Json(Envelope::ok(catalog()))
}

pub async fn select_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<SelectRequest>, JsonRejection>,
) -> Result<Json<Envelope<PredefinedMachine>>, AppError> {
    let Json(request) = payload?;
    if request.prompt.trim().is_empty() {
        return Err(AppError::ValidationError("Prompt is required".to_string()));
    }
    let machine = state.selector.select(&request.prompt).await;
    Ok(Json(Envelope::ok(machine)))
}
