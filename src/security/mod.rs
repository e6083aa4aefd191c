/// Security primitives
///
/// - `jwt`: token issuance and verification (HS256, one secret per kind)
/// - `ledger`: Redis-backed refresh-token revocation ledger
pub mod jwt;
pub mod ledger;

pub use jwt::{fingerprint, Claims, TokenKind, TokenService};
pub use ledger::RedisRevocationLedger;
