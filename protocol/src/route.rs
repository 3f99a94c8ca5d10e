//! Routes identify the handler for a network message.

use std::fmt;

use crate::error::ProtocolError;

/// `service.method`, or just `method` when no service is given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub service: String,
    pub method: String,
}

impl Route {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.service.is_empty() {
            write!(f, "{}", self.method)
        } else {
            write!(f, "{}.{}", self.service, self.method)
        }
    }
}

/// Parse a dotted route string.
pub fn decode_route(route: &str) -> Result<Route, ProtocolError> {
    let parts: Vec<&str> = route.split('.').collect();
    for part in &parts {
        if part.trim().is_empty() {
            return Err(ProtocolError::RouteFieldEmpty);
        }
    }
    match parts.as_slice() {
        [service, method] => Ok(Route::new(*service, *method)),
        [method] => Ok(Route::new("", *method)),
        _ => Err(ProtocolError::InvalidRoute(route.to_string())),
    }
}
