//! DriveSync Drive - Google Drive adapter
//!
//! Keeps a local record store in step with records kept in the private
//! application-data space of a Google Drive account:
//! - OAuth2 sign-in (Authorization Code with PKCE) and a shared session
//! - Bootstrap of the full record set plus a change-feed cursor
//! - Delta queries from that cursor
//! - Record, revision and attachment operations
//!
//! Every operation returns an [`Operation`](drivesync_core::progress::Operation)
//! handle at once; progress, cancellation and the single result are observed
//! through it.
//!
//! ## Modules
//!
//! - [`api`] - Drive v3 resource types and the [`DriveApi`] port
//! - [`auth`] - OAuth2 PKCE authentication flow components
//! - [`bootstrap`] - Full listing with compensating rollback
//! - [`classify`] - Mapping of transport failures onto `SyncError`
//! - [`client`] - Drive v3 HTTP client
//! - [`convert`] - Drive resources to domain values
//! - [`delta`] - Change-feed queries for incremental synchronization
//! - [`files`] - Attachment upload, download and deletion
//! - [`query`] - Cancellable execution of a single request
//! - [`records`] - Record upload, download, deletion and metadata updates
//! - [`service`] - [`DriveService`] facade
//! - [`session`] - Authentication state and sign-in coalescing
//! - [`versions`] - Revision history

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod classify;
pub mod client;
pub mod convert;
pub mod delta;
pub mod files;
pub mod query;
pub mod records;
pub mod service;
pub mod session;
pub mod versions;

pub use api::{ApiError, DriveApi};
pub use auth::OAuthAuthenticator;
pub use bootstrap::{BootstrapOutput, BootstrapSynchronizer};
pub use client::DriveClient;
pub use delta::{DeltaChanges, DeltaSynchronizer};
pub use service::DriveService;
pub use session::{AuthError, Authenticator, Authorizer, DriveSession, StaticToken, Tokens};
