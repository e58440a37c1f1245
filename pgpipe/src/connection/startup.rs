//! Startup phase.
//!
//! <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-START-UP>
use crate::{
    Result,
    common::{unit_error, warning},
    notice::Notice,
    postgres::{
        BackendMessage,
        backend::{self, Authentication},
        frontend,
    },
    transaction::TransactionStatus,
    transport::{PgTransport, PgTransportExt},
};

unit_error! {
    /// The backend requested an authentication method other than trust or
    /// clear-text password.
    pub struct UnsupportedAuth("unsupported authentication method");
}

/// Startup phase successful response.
#[derive(Debug)]
pub struct StartupResponse {
    pub backend_key_data: Option<backend::BackendKeyData>,
    pub param_status: Vec<backend::ParameterStatus>,
    pub status: TransactionStatus,
}

/// Perform a startup message.
pub async fn startup<IO: PgTransport>(
    startup: frontend::Startup<'_>,
    password: Option<&str>,
    mut io: IO,
) -> Result<StartupResponse> {
    io.send_startup(startup);
    io.flush().await?;

    // For trust and clear-text password there is at most one request and one response.
    loop {
        match io.recv().await? {
            BackendMessage::Authentication(Authentication::Ok) => break,
            BackendMessage::Authentication(Authentication::CleartextPassword) => {
                io.send(frontend::PasswordMessage { password: password.unwrap_or_default() });
                io.flush().await?;
            },
            BackendMessage::Authentication(Authentication::Other(_code)) => {
                warning!("authentication method {_code} requested");
                Err(UnsupportedAuth)?
            },
            BackendMessage::ErrorResponse(e) => Err(Notice::parse(e.body)?)?,
            BackendMessage::NoticeResponse(_) => { },
            f => Err(f.unexpected("authentication"))?,
        }
    }

    // The backend process is being started, it may still fail.
    let mut param_status = vec![];
    let mut backend_key_data = None;

    let status = loop {
        use BackendMessage::*;
        match io.recv().await? {
            ReadyForQuery(ready) => break ready.status,
            BackendKeyData(key_data) => backend_key_data = Some(key_data),
            ParameterStatus(param) => param_status.push(param),
            NoticeResponse(_notice) => {
                warning!("startup notice: {}", Notice::parse(_notice.body)?);
            },
            ErrorResponse(e) => Err(Notice::parse(e.body)?)?,
            NegotiateProtocolVersion(_) => { },
            f => Err(f.unexpected("startup phase"))?,
        }
    };

    Ok(StartupResponse { backend_key_data, param_status, status })
}
