pub mod pagination;
pub mod password;
pub mod validation;

pub use pagination::{Page, PageParams, PageQuery};
pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use validation::ValidatedJson;
