//! Agent handlers.
//!
//! Non-admin callers only see and modify agents they own.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use sphynx_core::agents::lifecycle::AgentUpdate;
use sphynx_core::models::{Agent, User};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ActivateAgentRequest, ActivationTokenResponse, AgentIdQuery, AgentQuery, AgentResponse,
    CreateAgentRequest, IdQuery, MessageResponse, PageResponse, UpdateAgentRequest,
};

fn ensure_owner(caller: &User, owner_id: Uuid) -> AppResult<()> {
    if caller.is_admin() || caller.id == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not the owner of this agent".into()))
    }
}

/// Cut one page out of a full, id-ordered listing.
fn page_of(agents: Vec<Agent>, offset: i64, size: i64) -> Vec<Agent> {
    let skip = usize::try_from(offset).unwrap_or(usize::MAX);
    let take = usize::try_from(size).unwrap_or(0);
    agents.into_iter().skip(skip).take(take).collect()
}

async fn owned_agent(state: &AppState, caller: &User, agent_id: Uuid) -> AppResult<Agent> {
    let agent = state.agents.get_agent(agent_id).await?;
    ensure_owner(caller, agent.user_id)?;
    Ok(agent)
}

/// `GET /api/v1/agent/get`: by `agentId`, `agentName` or `userId`, otherwise
/// a page of agents (admins) or the caller's own agents.
pub async fn get_agents_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    Query(query): Query<AgentQuery>,
) -> AppResult<Json<PageResponse<AgentResponse>>> {
    let (page, size, offset) = query.paging().resolve();
    let agents = if let Some(id) = query.agent_id {
        vec![owned_agent(&state, &caller, id).await?]
    } else if let Some(name) = query.agent_name.as_deref() {
        let mut agents = state.agents.agents_by_name(name).await?;
        if !caller.is_admin() {
            agents.retain(|a| a.user_id == caller.id);
        }
        page_of(agents, offset, size)
    } else if let Some(owner_id) = query.user_id {
        ensure_owner(&caller, owner_id)?;
        page_of(state.agents.agents_for_owner(owner_id).await?, offset, size)
    } else if caller.is_admin() {
        state.agents.list_agents(offset, size).await?
    } else {
        page_of(state.agents.agents_for_owner(caller.id).await?, offset, size)
    };
    Ok(Json(PageResponse {
        items: agents.into_iter().map(AgentResponse::from).collect(),
        page,
        size,
    }))
}

/// `POST /api/v1/agent/create`: new `INACTIVE` agent with a fresh activation
/// token.
pub async fn create_agent_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    Json(body): Json<CreateAgentRequest>,
) -> AppResult<(StatusCode, Json<AgentResponse>)> {
    let owner_id = body.user_id.unwrap_or(caller.id);
    ensure_owner(&caller, owner_id)?;
    let agent = state
        .agents
        .create_agent(owner_id, &body.agent_name, body.agent_config)
        .await?;
    Ok((StatusCode::CREATED, Json(agent.into())))
}

/// `PATCH /api/v1/agent/update?id=`
pub async fn update_agent_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    Query(query): Query<IdQuery>,
    Json(body): Json<UpdateAgentRequest>,
) -> AppResult<Json<AgentResponse>> {
    owned_agent(&state, &caller, query.id).await?;
    let update = AgentUpdate {
        name: body.agent_name,
        config: body.agent_config,
    };
    let agent = state.agents.update_agent(query.id, update).await?;
    Ok(Json(agent.into()))
}

/// `DELETE /api/v1/agent/delete?id=`
pub async fn delete_agent_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<MessageResponse>> {
    owned_agent(&state, &caller, query.id).await?;
    state.agents.delete_agent(query.id).await?;
    Ok(Json(MessageResponse::new("Agent deleted")))
}

/// `GET /api/v1/agent/refresh-activation-token?agentId=`
pub async fn refresh_activation_token_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    Query(query): Query<AgentIdQuery>,
) -> AppResult<Json<ActivationTokenResponse>> {
    owned_agent(&state, &caller, query.agent_id).await?;
    let activation_token = state.agents.refresh_activation_token(query.agent_id).await?;
    Ok(Json(ActivationTokenResponse { activation_token }))
}

/// `POST /api/v1/agent/activate`: called by the agent itself; the activation
/// token is the credential.
pub async fn activate_agent_handler(
    State(state): State<AppState>,
    Json(body): Json<ActivateAgentRequest>,
) -> AppResult<Json<AgentResponse>> {
    let agent = state.agents.activate_agent(&body.activation_token).await?;
    Ok(Json(agent.into()))
}
