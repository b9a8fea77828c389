//! Warden Auth — session and token lifecycle, device fingerprinting and
//! login anomaly detection.

pub mod anomaly;
pub mod config;
pub mod device;
pub mod error;
pub mod service;
pub mod token;

pub use anomaly::{AnomalyDetector, IpRange, SessionInvalidator};
pub use config::{AnomalyConfig, AnomalyWeights, AuthConfig, RiskThresholds};
pub use device::{DeviceHistoryLimits, DeviceTracker, create_device_profile};
pub use error::{AuthError, TokenRejection};
pub use service::{IssuedSession, RefreshedAccess, SessionManager, TokenPair, ValidatedToken};
pub use token::{SessionBinding, TokenClaims, TokenKind, TokenSigner, token_hash};
