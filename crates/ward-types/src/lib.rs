//! Shared value types for the ward multi-tenant service core.
//!
//! Kept dependency-free of any transport/storage crate so that
//! `ward-policy`, `ward-store`, `ward-query`, `ward-scheduler`, and
//! `ward-rpc` can each depend on it without pulling in the others.

mod claims;
mod key;
mod locale;
mod money;

pub use claims::Claims;
pub use key::{Key, Metadata, Target};
pub use locale::{Locale, LocaleError, Localized, LANGUAGES, REGIONS};
pub use money::{Currency, Money, MoneyError};
