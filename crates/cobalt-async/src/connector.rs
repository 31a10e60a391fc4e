use cobalt_connector::{
    ClientConnector, ClientConnectorState, ConnectionResult, ConnectorError, ConnectorErrorExt as _, ConnectorResult,
    Sequence as _, State as _, RECOMMENDED_HANDSHAKE_TIMEOUT,
};
use cobalt_core::WriteBuf;

use crate::framed::{single_sequence_step, Framed, FramedRead, FramedWrite};

#[non_exhaustive]
pub struct ShouldUpgrade;

/// Drives the connection sequence until the security upgrade point: the
/// caller then performs the TLS handshake on the inner stream.
pub async fn connect_begin<S>(framed: &mut Framed<S>, connector: &mut ClientConnector) -> ConnectorResult<ShouldUpgrade>
where
    S: Sync + FramedRead + FramedWrite,
{
    let mut buf = WriteBuf::new();

    info!("Begin connection procedure");

    while !connector.should_perform_security_upgrade() {
        single_connect_step(framed, connector, &mut buf).await?;
    }

    Ok(ShouldUpgrade)
}

pub fn skip_connect_begin(connector: &mut ClientConnector) -> ShouldUpgrade {
    debug_assert!(connector.should_perform_security_upgrade());
    ShouldUpgrade
}

#[non_exhaustive]
pub struct Upgraded;

pub fn mark_as_upgraded(_: ShouldUpgrade, connector: &mut ClientConnector) -> ConnectorResult<Upgraded> {
    trace!("Marked as upgraded");
    connector.mark_security_upgrade_as_done()?;
    Ok(Upgraded)
}

/// Drives the connection sequence to completion on the upgraded transport.
///
/// When CredSSP was negotiated, the exchange must have been performed by the
/// caller beforehand (see [`ClientConnector::mark_credssp_as_done`]).
pub async fn connect_finalize<S>(
    _: Upgraded,
    framed: &mut Framed<S>,
    mut connector: ClientConnector,
) -> ConnectorResult<ConnectionResult>
where
    S: FramedRead + FramedWrite,
{
    let mut buf = WriteBuf::new();

    if connector.should_perform_credssp() {
        connector.mark_credssp_as_done()?;
    }

    let result = loop {
        single_connect_step(framed, &mut connector, &mut buf).await?;

        if let ClientConnectorState::Connected { result } = connector.state {
            break result;
        }
    };

    info!("Connected with success");

    Ok(result)
}

/// Runs one step of the connection sequence.
pub async fn single_connect_step<S>(
    framed: &mut Framed<S>,
    connector: &mut ClientConnector,
    buf: &mut WriteBuf,
) -> ConnectorResult<()>
where
    S: FramedRead + FramedWrite,
{
    debug!(connector.state = connector.state.name(), "Connection sequence step");

    single_sequence_step(framed, connector, buf).await
}

/// Applies the recommended handshake deadline to a connection future.
///
/// The handshake has a bounded total deadline; steady state has none.
pub async fn with_handshake_timeout<F, T>(future: F) -> ConnectorResult<T>
where
    F: core::future::Future<Output = ConnectorResult<T>>,
{
    match tokio::time::timeout(RECOMMENDED_HANDSHAKE_TIMEOUT, future).await {
        Ok(result) => result,
        Err(elapsed) => Err(ConnectorError::custom("handshake timeout", elapsed)),
    }
}
