use ebus_derive::ebus_error;
use std::borrow::Cow;

#[ebus_error]
pub enum DemoError {
    #[error("IO error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    #[error("Rejected{}: {message}", format_context(.context))]
    Rejected { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn read() -> Result<String, DemoError> {
    std::fs::read_to_string("missing.toml").context("Reading demo settings")
}

fn reject() -> Result<(), DemoError> {
    Err(DemoError::Rejected { message: "closed".into(), context: None })
}

fn main() {
    let err = reject().unwrap_err();
    assert!(err.context_message().is_none());

    let err = reject().context("bus.name").unwrap_err();
    assert_eq!(err.context_message(), Some("bus.name"));
    assert_eq!(err.to_string(), "Rejected (bus.name): closed");

    let err = read().unwrap_err();
    assert_eq!(err.context_message(), Some("Reading demo settings"));
}
