use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("InvalidParentReference: {0}")]
    InvalidParentReference(String),

    #[error("ImagePullPolicy must be one of \"Always\" or \"IfNotPresent\"; value=\"{0}\"")]
    InvalidImagePullPolicy(String),

    #[error("Invalid resource quantity \"{value}\": {reason}")]
    InvalidResourceQuantity { value: String, reason: String },

    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),
}

impl Error {
    pub fn metric_label(&self) -> String {
        let label = match self {
            Error::InvalidParentReference(_) => "invalidparentreference",
            Error::InvalidImagePullPolicy(_) => "invalidimagepullpolicy",
            Error::InvalidResourceQuantity { .. } => "invalidresourcequantity",
            Error::InvalidArgument(_) => "invalidargument",
            Error::KubeError(_) => "kubeerror",
        };
        label.to_string()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_pull_policy_message_names_value() {
        let err = Error::InvalidImagePullPolicy("Sometimes".to_string());
        assert_eq!(
            err.to_string(),
            "ImagePullPolicy must be one of \"Always\" or \"IfNotPresent\"; value=\"Sometimes\""
        );
        assert_eq!(err.metric_label(), "invalidimagepullpolicy");
    }

    #[test]
    fn test_quantity_message() {
        let err = Error::InvalidResourceQuantity {
            value: "1GG".to_string(),
            reason: "unknown suffix".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid resource quantity \"1GG\": unknown suffix");
        assert_eq!(err.metric_label(), "invalidresourcequantity");
    }
}
