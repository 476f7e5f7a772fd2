//! PostgreSQL binding store.
//!
//! Persistent [`LinkStore`] backed by sqlx. The `(site, external_profile_id)`
//! uniqueness invariant is enforced by a partial unique index; the canonical
//! lookup takes a row lock (`FOR UPDATE`) so concurrent reconciliations for
//! the same external profile serialize instead of double-confirming.
//!
//! # Example
//!
//! ```no_run
//! use thirdparty_link::stores::PostgresLinkStore;
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgresql://localhost/linking").await?;
//! let store = PostgresLinkStore::new(pool);
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{LinkError, Result};
use crate::providers::{LinkStore, LinkStoreTx};
use crate::state::{
    AccessCredentials, AuditEntry, Binding, BindingId, ClientId, HandshakeState, Ownership,
    SessionId, Site,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

const SELECT_BINDING: &str = "SELECT id, site, external_profile_id, access_token, \
     access_token_secret, refresh_token, owner_client_id, pending_session_id, \
     pending_expires_at, profile, handshake_token, handshake_secret, redirect, \
     created_at, updated_at FROM bindings";

/// PostgreSQL [`LinkStore`].
#[derive(Clone)]
pub struct PostgresLinkStore {
    pool: PgPool,
}

impl PostgresLinkStore {
    /// Create a new store on an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Storage`] if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LinkError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }
}

fn storage_err(context: &str, err: &sqlx::Error) -> LinkError {
    LinkError::Storage(format!("{context}: {err}"))
}

fn binding_from_row(row: &PgRow) -> Result<Binding> {
    let site_str: String = row
        .try_get("site")
        .map_err(|e| storage_err("Failed to read site", &e))?;
    let site: Site = site_str
        .parse()
        .map_err(|e: String| LinkError::Storage(format!("Corrupt site column: {e}")))?;

    let access_token: Option<String> = row
        .try_get("access_token")
        .map_err(|e| storage_err("Failed to read access_token", &e))?;
    let credentials = access_token.map(|token| -> Result<AccessCredentials> {
        Ok(AccessCredentials {
            access_token: token,
            access_token_secret: row
                .try_get("access_token_secret")
                .map_err(|e| storage_err("Failed to read access_token_secret", &e))?,
            refresh_token: row
                .try_get("refresh_token")
                .map_err(|e| storage_err("Failed to read refresh_token", &e))?,
        })
    });
    let credentials = credentials.transpose()?;

    let owner_client_id: Option<uuid::Uuid> = row
        .try_get("owner_client_id")
        .map_err(|e| storage_err("Failed to read owner_client_id", &e))?;
    let pending_session_id: Option<uuid::Uuid> = row
        .try_get("pending_session_id")
        .map_err(|e| storage_err("Failed to read pending_session_id", &e))?;
    let pending_expires_at: Option<DateTime<Utc>> = row
        .try_get("pending_expires_at")
        .map_err(|e| storage_err("Failed to read pending_expires_at", &e))?;

    let ownership = match (owner_client_id, pending_session_id, pending_expires_at) {
        (Some(client), None, _) => Ownership::Confirmed {
            client_id: ClientId(client),
        },
        (None, Some(session), Some(expires_at)) => Ownership::Pending {
            session_id: SessionId(session),
            expires_at,
        },
        (None, None, _) => Ownership::Unclaimed,
        _ => {
            return Err(LinkError::Storage(
                "Corrupt ownership columns on bindings row".to_string(),
            ));
        }
    };

    Ok(Binding {
        id: BindingId(
            row.try_get("id")
                .map_err(|e| storage_err("Failed to read id", &e))?,
        ),
        site,
        external_profile_id: row
            .try_get("external_profile_id")
            .map_err(|e| storage_err("Failed to read external_profile_id", &e))?,
        credentials,
        ownership,
        profile: row
            .try_get("profile")
            .map_err(|e| storage_err("Failed to read profile", &e))?,
        handshake: HandshakeState {
            token: row
                .try_get("handshake_token")
                .map_err(|e| storage_err("Failed to read handshake_token", &e))?,
            secret: row
                .try_get("handshake_secret")
                .map_err(|e| storage_err("Failed to read handshake_secret", &e))?,
        },
        redirect: row
            .try_get("redirect")
            .map_err(|e| storage_err("Failed to read redirect", &e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| storage_err("Failed to read created_at", &e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| storage_err("Failed to read updated_at", &e))?,
    })
}

/// Ownership columns for an insert/update, flattened from the tagged union.
const fn ownership_columns(
    ownership: &Ownership,
) -> (
    Option<uuid::Uuid>,
    Option<uuid::Uuid>,
    Option<DateTime<Utc>>,
) {
    match ownership {
        Ownership::Unclaimed => (None, None, None),
        Ownership::Pending {
            session_id,
            expires_at,
        } => (None, Some(session_id.0), Some(*expires_at)),
        Ownership::Confirmed { client_id } => (Some(client_id.0), None, None),
    }
}

impl LinkStore for PostgresLinkStore {
    type Tx = PostgresLinkTx;

    async fn create(&self, binding: &Binding) -> Result<()> {
        let (owner, pending_session, pending_expires) = ownership_columns(&binding.ownership);
        let credentials = binding.credentials.as_ref();

        sqlx::query(
            "INSERT INTO bindings (id, site, external_profile_id, access_token, \
             access_token_secret, refresh_token, owner_client_id, pending_session_id, \
             pending_expires_at, profile, handshake_token, handshake_secret, redirect, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(binding.id.0)
        .bind(binding.site.as_str())
        .bind(&binding.external_profile_id)
        .bind(credentials.map(|c| c.access_token.clone()))
        .bind(credentials.and_then(|c| c.access_token_secret.clone()))
        .bind(credentials.and_then(|c| c.refresh_token.clone()))
        .bind(owner)
        .bind(pending_session)
        .bind(pending_expires)
        .bind(&binding.profile)
        .bind(&binding.handshake.token)
        .bind(&binding.handshake.secret)
        .bind(&binding.redirect)
        .bind(binding.created_at)
        .bind(binding.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to create binding", &e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: BindingId) -> Result<Option<Binding>> {
        sqlx::query(&format!("{SELECT_BINDING} WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("Failed to load binding", &e))?
            .map(|row| binding_from_row(&row))
            .transpose()
    }

    async fn find_by_handshake_token(&self, token: &str) -> Result<Option<Binding>> {
        sqlx::query(&format!("{SELECT_BINDING} WHERE handshake_token = $1"))
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("Failed to load binding by handshake token", &e))?
            .map(|row| binding_from_row(&row))
            .transpose()
    }

    async fn find_by_access_token(&self, token: &str) -> Result<Option<Binding>> {
        sqlx::query(&format!("{SELECT_BINDING} WHERE access_token = $1"))
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("Failed to load binding by access token", &e))?
            .map(|row| binding_from_row(&row))
            .transpose()
    }

    async fn begin(&self) -> Result<PostgresLinkTx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_err("Failed to start transaction", &e))?;
        Ok(PostgresLinkTx { tx })
    }
}

/// Scoped transaction over [`PostgresLinkStore`].
pub struct PostgresLinkTx {
    tx: Transaction<'static, Postgres>,
}

impl LinkStoreTx for PostgresLinkTx {
    async fn find_by_provider_profile(
        &mut self,
        site: Site,
        external_profile_id: &str,
    ) -> Result<Option<Binding>> {
        // The row lock serializes concurrent reconciliations of the same
        // external profile for the life of this transaction.
        sqlx::query(&format!(
            "{SELECT_BINDING} WHERE site = $1 AND external_profile_id = $2 FOR UPDATE"
        ))
        .bind(site.as_str())
        .bind(external_profile_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| storage_err("Failed to load canonical binding", &e))?
        .map(|row| binding_from_row(&row))
        .transpose()
    }

    async fn update(&mut self, binding: &Binding) -> Result<Binding> {
        let (owner, pending_session, pending_expires) = ownership_columns(&binding.ownership);
        let credentials = binding.credentials.as_ref();

        let row = sqlx::query(
            "UPDATE bindings SET site = $2, external_profile_id = $3, access_token = $4, \
             access_token_secret = $5, refresh_token = $6, owner_client_id = $7, \
             pending_session_id = $8, pending_expires_at = $9, profile = $10, \
             handshake_token = $11, handshake_secret = $12, redirect = $13, \
             updated_at = NOW() \
             WHERE id = $1 \
             RETURNING id, site, external_profile_id, access_token, access_token_secret, \
             refresh_token, owner_client_id, pending_session_id, pending_expires_at, \
             profile, handshake_token, handshake_secret, redirect, created_at, updated_at",
        )
        .bind(binding.id.0)
        .bind(binding.site.as_str())
        .bind(&binding.external_profile_id)
        .bind(credentials.map(|c| c.access_token.clone()))
        .bind(credentials.and_then(|c| c.access_token_secret.clone()))
        .bind(credentials.and_then(|c| c.refresh_token.clone()))
        .bind(owner)
        .bind(pending_session)
        .bind(pending_expires)
        .bind(&binding.profile)
        .bind(&binding.handshake.token)
        .bind(&binding.handshake.secret)
        .bind(&binding.redirect)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return LinkError::StorageConflict;
                }
            }
            storage_err("Failed to update binding", &e)
        })?;

        match row {
            Some(row) => binding_from_row(&row),
            None => Err(LinkError::NotFound),
        }
    }

    async fn delete(&mut self, id: BindingId) -> Result<()> {
        let result = sqlx::query("DELETE FROM bindings WHERE id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| storage_err("Failed to delete binding", &e))?;

        if result.rows_affected() == 0 {
            return Err(LinkError::NotFound);
        }
        Ok(())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (action, target, client, data, recorded_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.action.as_str())
        .bind(entry.target.0)
        .bind(entry.client.map(|c| c.0))
        .bind(&entry.data)
        .bind(entry.recorded_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| storage_err("Failed to append audit entry", &e))?;

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| storage_err("Failed to commit transaction", &e))
    }

    async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| storage_err("Failed to roll back transaction", &e))
    }
}
