//! HTTP server lifecycle

use std::net::SocketAddr;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::auth::policy::AuthorizationPolicy;
use crate::auth::{
    AuthState, BearerValidator, IssuerTemplates, JwksCache, KeySource, OidcChallenge,
    RouteTable, SchemeRegistry, SessionCodec, jwks,
};
use crate::config::Config;
use crate::graphql::Schema;
use crate::{Error, Result};

/// The sample's HTTP server
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a server from validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when required authentication values are
    /// missing; configuration errors are fatal before the listener binds.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Build the immutable per-process application state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when scheme registration fails.
    pub fn build_state(config: &Config) -> Result<Arc<AppState>> {
        let authn = &config.authentication;

        let registry = SchemeRegistry::from_config(authn)?;
        let session = SessionCodec::new(
            &config.session.resolve_secret(),
            config.session.cookie_name.clone(),
            config.session.ttl,
        );

        let templates = IssuerTemplates {
            allowed: authn.valid_issuers.clone(),
            default: authn.default_issuer.clone(),
        };
        let key_source = match &authn.signing_key {
            Some(secret) => {
                warn!("Using a static signing key; intended for development and tests only");
                KeySource::Static {
                    key: DecodingKey::from_secret(secret.as_bytes()),
                    algorithm: Algorithm::HS256,
                }
            }
            None => KeySource::Jwks {
                cache: Arc::new(JwksCache::new()),
                jwks_uri: authn
                    .jwks_uri
                    .clone()
                    .unwrap_or_else(|| jwks::default_jwks_uri(&authn.authority)),
            },
        };
        let bearer = BearerValidator::new(authn.client_id.clone(), templates, key_source);

        let auth = Arc::new(AuthState {
            registry,
            policy: AuthorizationPolicy::default_policy(),
            session,
            bearer,
            challenge: OidcChallenge::from_config(authn),
            external_url: config.server.resolve_external_url(),
        });

        Ok(Arc::new(AppState {
            auth,
            schema: Arc::new(Schema::sample()),
            routes: Arc::new(RouteTable::standard()),
        }))
    }

    /// Run the server until shutdown
    ///
    /// # Errors
    ///
    /// Returns an error when the listener cannot bind or the server fails.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let state = Self::build_state(&self.config)?;
        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(authority = %self.config.authentication.authority, "Identity provider bound");
        info!(
            issuers = ?self.config.authentication.valid_issuers,
            "Multi-tenant issuer templates"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
