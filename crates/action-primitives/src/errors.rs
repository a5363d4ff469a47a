use cdp_adapter::DriverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unsupported method '{0}'")]
    UnsupportedMethod(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("no xpath cached for encoded id '{0}'")]
    NoXPathForEncodedId(String),
    #[error("no xpath map cached; fetch the page structure first")]
    XPathMapNotCached,
    #[error("clicked element did not trigger a dialog")]
    DialogNotFired,
    #[error(transparent)]
    Driver(#[from] DriverError),
}
