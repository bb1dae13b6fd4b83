use serde::Deserialize;
use serde_valid::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct Register {
    #[validate(min_length = 3)]
    #[validate(max_length = 64)]
    pub username: String,
    #[validate(min_length = 6)]
    pub password: String,
    #[validate(min_length = 1)]
    pub name: String,
    #[validate(pattern = r"^[^@\s]+@[^@\s]+$")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct Login {
    #[validate(min_length = 1)]
    pub username: String,
    #[validate(min_length = 1)]
    pub password: String,
}
