//! Certificate handling: PEM parsing, key/cert pair validation, private
//! key generation, and the content-addressed certificate store.

pub mod domains;
pub mod keys;
pub mod parse;
pub mod save;
pub mod validate;

pub use domains::contains_all_ignoring_repeats;
pub use keys::KeyAlgorithm;
pub use parse::{parse_cert_pem, CertInfo};
pub use save::{get_cert, save_cert, upload_cert, CertBundle};
pub use validate::validate_certificate;
