pub(crate) mod checkout;
pub(crate) mod file;
pub(crate) mod log_source;
pub(crate) mod revision;
pub(crate) mod rlog;
