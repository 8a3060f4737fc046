//! Control panel operations and their wiring (store, event sink, listener).

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use boardcp_auth::{
    AuthzError, PermissionSet, Principal, Role, Scope, can_edit_config, can_set_permissions, form_key,
    plan_grant_update,
};
use boardcp_core::{BoardUri, RoleId};
use boardcp_events::{Event, EventBus, InMemoryEventBus, RoleEvent, RoleEventSink, RolePermissionsModified};
use boardcp_infra::seed::install_defaults;
use boardcp_infra::{Board, ControlPanelStore, InMemoryStore, PostgresStore, StoreError, resolve_permissions};

use crate::app::dto::{CreateRoleForm, FieldErrors, PermissionEditorView, RoleIndexView};
use crate::config::ApiConfig;

const CASTE_TAKEN: &str = "The role caste has already been taken.";

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("validation failed")]
    Validation {
        errors: FieldErrors,
        input: CreateRoleForm,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct AppServices {
    store: Arc<dyn ControlPanelStore>,
    events: Arc<dyn RoleEventSink>,
}

impl AppServices {
    pub fn new(store: Arc<dyn ControlPanelStore>, events: Arc<dyn RoleEventSink>) -> Self {
        Self { store, events }
    }

    async fn board(&self, board_uri: &BoardUri) -> Result<Board, PanelError> {
        self.store
            .find_board(board_uri)
            .await?
            .ok_or_else(|| PanelError::NotFound(format!("board '{board_uri}'")))
    }

    async fn board_for_config(&self, board_uri: &BoardUri, principal: &Principal) -> Result<Board, PanelError> {
        let board = self.board(board_uri).await?;
        let perms = resolve_permissions(&*self.store, principal, Scope::Board(board_uri.clone())).await?;
        can_edit_config(board_uri, &perms)?;
        Ok(board)
    }

    /// Board, role and the editor's permissions in the role's governing scope,
    /// once the editor is allowed to set the role's permissions.
    async fn editable_role(
        &self,
        board_uri: &BoardUri,
        role_id: RoleId,
        principal: &Principal,
    ) -> Result<(Board, Role, PermissionSet), PanelError> {
        let board = self.board(board_uri).await?;
        let role = self
            .store
            .find_role(role_id)
            .await?
            .filter(|role| role.applies_to(board_uri))
            .ok_or_else(|| PanelError::NotFound(format!("role {role_id}")))?;

        let perms = resolve_permissions(&*self.store, principal, Scope::governing(&role)).await?;
        can_set_permissions(&role, &perms)?;
        Ok((board, role, perms))
    }

    async fn editor_view(&self, board: &Board, role: &Role, perms: &PermissionSet) -> Result<PermissionEditorView, PanelError> {
        let groups = self.store.permission_groups().await?;
        let grants = self.store.grants_for_roles(&[role.role_id]).await?;
        Ok(PermissionEditorView::new(board, role, &groups, &grants, perms))
    }

    /// Roles selectable as a parent on `board_uri`.
    pub async fn role_index(&self, board_uri: &BoardUri, principal: &Principal) -> Result<RoleIndexView, PanelError> {
        let board = self.board_for_config(board_uri, principal).await?;
        let roles = self.store.parent_candidates(board_uri, principal).await?;
        Ok(RoleIndexView::new(&board, &roles))
    }

    /// Create a board role from the submitted form.
    ///
    /// Every field error, caste uniqueness included, is reported together and
    /// nothing is persisted unless all fields pass.
    pub async fn create_role(
        &self,
        board_uri: &BoardUri,
        principal: &Principal,
        form: &CreateRoleForm,
    ) -> Result<Role, PanelError> {
        self.board_for_config(board_uri, principal).await?;

        let invalid = |errors: FieldErrors| PanelError::Validation {
            errors,
            input: form.clone(),
        };

        let draft = match form.validate() {
            Ok(draft) => draft,
            Err(mut errors) => {
                let mut scratch = FieldErrors::default();
                if let Some(caste) = form.validate_caste(&mut scratch) {
                    if self.store.caste_exists(board_uri, &caste).await? {
                        errors.add(CreateRoleForm::CASTE, CASTE_TAKEN);
                    }
                }
                return Err(invalid(errors));
            }
        };

        if self.store.caste_exists(board_uri, &draft.caste).await? {
            let mut errors = FieldErrors::default();
            errors.add(CreateRoleForm::CASTE, CASTE_TAKEN);
            return Err(invalid(errors));
        }

        let role = Role::new_for_board(board_uri.clone(), draft.caste, draft.name, draft.capcode);
        match self.store.insert_role(&role).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                let mut errors = FieldErrors::default();
                errors.add(CreateRoleForm::CASTE, CASTE_TAKEN);
                return Err(invalid(errors));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            board_uri = %board_uri,
            role_id = %role.role_id,
            caste = %role.caste,
            user_id = %principal.user_id,
            "role created"
        );
        Ok(role)
    }

    pub async fn permission_editor(
        &self,
        board_uri: &BoardUri,
        role_id: RoleId,
        principal: &Principal,
    ) -> Result<PermissionEditorView, PanelError> {
        let (board, role, perms) = self.editable_role(board_uri, role_id, principal).await?;
        self.editor_view(&board, &role, &perms).await
    }

    /// Apply a submitted permission form to a role's grants.
    ///
    /// `submitted` holds `(form_key, value)` pairs in submission order. Only
    /// permissions the editor holds are touched; the replacement is atomic and
    /// followed by a `RolePermissionsModified` event.
    pub async fn commit_permissions(
        &self,
        board_uri: &BoardUri,
        role_id: RoleId,
        principal: &Principal,
        submitted: &[(String, String)],
    ) -> Result<PermissionEditorView, PanelError> {
        let (board, role, perms) = self.editable_role(board_uri, role_id, principal).await?;

        let catalog = self.store.permissions().await?;
        let plan = plan_grant_update(role.role_id, &catalog, &perms, submitted);

        let unknown = submitted
            .iter()
            .filter(|(key, _)| {
                let id = form_key::decode(key);
                !catalog.iter().any(|p| p.permission_id.as_str() == id)
            })
            .count();
        if unknown + plan.beyond_ceiling.len() + plan.unrecognized.len() > 0 {
            debug!(
                role_id = %role.role_id,
                unknown,
                beyond_ceiling = plan.beyond_ceiling.len(),
                unrecognized = plan.unrecognized.len(),
                "ignored permission form entries"
            );
        }

        self.store
            .replace_grants(role.role_id, &plan.clear, &plan.attach)
            .await?;

        let (allowed, denied): (Vec<_>, Vec<_>) = plan.attach.iter().partition(|g| g.value);
        info!(
            role_id = %role.role_id,
            user_id = %principal.user_id,
            cleared = plan.clear.len(),
            allowed = allowed.len(),
            denied = denied.len(),
            "role permissions modified"
        );

        self.events.emit(RoleEvent::PermissionsModified(RolePermissionsModified {
            event_id: Uuid::now_v7(),
            role_id: role.role_id,
            board_uri: role.board_uri.clone(),
            modified_by: principal.user_id,
            cleared: plan.clear.clone(),
            allowed: allowed.into_iter().map(|g| g.permission_id.clone()).collect(),
            denied: denied.into_iter().map(|g| g.permission_id.clone()).collect(),
            occurred_at: Utc::now(),
        }));

        // The editor may have changed grants of a role they hold.
        let perms = resolve_permissions(&*self.store, principal, Scope::governing(&role)).await?;
        self.editor_view(&board, &role, &perms).await
    }
}

/// Log every role event published on `bus` until the bus is dropped.
pub fn spawn_role_event_listener(bus: &InMemoryEventBus<RoleEvent>) -> tokio::task::JoinHandle<()> {
    let sub = bus.subscribe();
    tokio::task::spawn_blocking(move || {
        while let Ok(event) = sub.recv() {
            let event_type = event.event_type();
            let version = event.version();
            match &event {
                RoleEvent::PermissionsModified(e) => info!(
                    event_type,
                    version,
                    role_id = %e.role_id,
                    modified_by = %e.modified_by,
                    cleared = e.cleared.len(),
                    allowed = e.allowed.len(),
                    denied = e.denied.len(),
                    "role event"
                ),
            }
        }
        debug!("role event bus closed");
    })
}

/// Build the store selected by `config`, seed it, and start the event listener.
pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn ControlPanelStore> = match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await?;
            let store = PostgresStore::new(pool);
            store.migrate().await?;
            let admin = install_defaults(&store, &config.boards).await?;
            info!(backend = "postgres", admin_role = %admin, "store ready");
            Arc::new(store)
        }
        None => {
            let store = InMemoryStore::new();
            let admin = install_defaults(&store, &config.boards).await?;
            info!(backend = "memory", admin_role = %admin, "store ready");
            Arc::new(store)
        }
    };

    let bus = Arc::new(InMemoryEventBus::<RoleEvent>::new());
    spawn_role_event_listener(&bus);

    Ok(AppServices::new(store, bus))
}
