use std::borrow::Cow;

/// Errors that can occur during event bus operations.
///
/// Dispatch itself never fails; these cover connection management, the
/// deferred queue and configuration.
#[ebus_derive::ebus_error]
pub enum BusError {
    /// A single-address handler was asked to connect while connected to another id.
    #[error("Handler already connected{}: {message}", format_context(.context))]
    AlreadyConnected { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The bus context was torn down by [`Bus::shutdown`](crate::Bus::shutdown).
    #[error("Bus shut down{}: {message}", format_context(.context))]
    Shutdown { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The deferred event queue reached its configured capacity.
    #[error("Event queue full{}: {message}", format_context(.context))]
    QueueFull { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A configuration value is out of range.
    #[error("Invalid bus configuration{}: {message}", format_context(.context))]
    InvalidConfiguration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Loading layered configuration failed.
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}
