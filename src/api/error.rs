use std::fmt;

/// Which fetch of the pipeline a data problem belongs to. Each fetch is
/// reported separately so the caller can tell which stage broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ThisMonth,
    PreviousMonth,
    History,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ThisMonth => write!(f, "this month"),
            Stage::PreviousMonth => write!(f, "previous month"),
            Stage::History => write!(f, "history"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The login page no longer carries the expected hidden CSRF field.
    TokenNotFound,
    /// The login POST failed at the transport level.
    LoginSubmission(String),
    /// No `eZSESSID` cookie after the login POST. Wrong credentials and a
    /// changed portal are indistinguishable here.
    InvalidCredentials,
    /// A data endpoint answered with a non-success status.
    Http(String),
    /// A series body could not be interpreted, tagged with the fetch stage.
    Data(Stage, String),
    InternalError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TokenNotFound => {
                write!(f, "Can not find the CSRF token in the login page.")
            }
            Error::LoginSubmission(detail) => {
                write!(f, "Can not submit login form: {}", detail)
            }
            Error::InvalidCredentials => {
                write!(f, "Login error: Please check your username/password.")
            }
            Error::Http(detail) => write!(f, "{}", detail),
            Error::Data(stage, detail) => {
                write!(f, "Issue with {} data: {}", stage, detail)
            }
            Error::InternalError => write!(f, "Internal error."),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::{Error, Stage};

    #[test]
    fn data_errors_name_their_stage() {
        let this_month = Error::Data(Stage::ThisMonth, "x".to_string());
        let previous = Error::Data(Stage::PreviousMonth, "x".to_string());
        let history = Error::Data(Stage::History, "x".to_string());

        assert_eq!("Issue with this month data: x", this_month.to_string());
        assert_eq!("Issue with previous month data: x", previous.to_string());
        assert_eq!("Issue with history data: x", history.to_string());
    }

    #[test]
    fn credentials_error_tells_user_what_to_check() {
        assert_eq!(
            "Login error: Please check your username/password.",
            Error::InvalidCredentials.to_string()
        );
    }
}
