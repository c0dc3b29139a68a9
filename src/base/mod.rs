//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): transport error codes matching `net_error_list.h`
//! - [`HttpError`](error::HttpError): the error handed to failure callbacks

pub mod context;
pub mod error;
pub mod neterror;
