use core::time::Duration;

use cobalt_connector::connection_activation::{ConnectionActivationSequence, ConnectionActivationState};
use cobalt_connector::ConnectionResult;
use cobalt_core::WriteBuf;
use cobalt_pdu::geometry::InclusiveRectangle;
use cobalt_pdu::input::fast_path::{FastPathInputEvent, SynchronizeFlags};
use cobalt_session::image::DecodedImage;
use cobalt_session::pointer::PointerUpdate;
use cobalt_session::{ActiveStage, ActiveStageOutput, GracefulDisconnectReason, SessionError, SessionErrorExt as _, SessionResult};
use tokio::sync::mpsc;

use crate::framed::{single_sequence_step, Framed, FramedRead, FramedWrite};

/// Interval at which a no-op synchronize input event is sent to keep
/// NAT/middlebox state alive while the user is idle.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(120);

/// The pixel-display front end, driven from the session read loop.
///
/// `on_bitmap` is the back-pressure point: a slow consumer stalls the
/// reader, which ultimately stalls the server.
pub trait DisplaySink {
    /// Called once the capabilities exchange settled on a desktop size, and
    /// again on any server-initiated resize.
    fn on_desktop_size_change(&mut self, width: u16, height: u16, bpp: u16);

    /// A rectangular pixel update in top-down RGBA.
    fn on_bitmap(&mut self, rect: InclusiveRectangle, pixels_rgba: Vec<u8>);

    /// Cursor change or move.
    fn on_pointer_update(&mut self, update: PointerUpdate);

    /// Terminal event.
    fn on_disconnect(&mut self, reason: &str);
}

/// Dynamic virtual channel events, surfaced to the caller.
pub trait ChannelHandler {
    fn on_channel_open(&mut self, name: &str, channel_id: u32);

    fn on_channel_data(&mut self, channel_id: u32, data: &[u8]);

    fn on_channel_close(&mut self, channel_id: u32);
}

/// Messages accepted by the session writer.
#[derive(Debug)]
pub enum OutboundMessage {
    /// Input events supplied by the input source, sent in order.
    Input(Vec<FastPathInputEvent>),
    /// Opaque data for an open dynamic virtual channel.
    ChannelData { channel_id: u32, data: Vec<u8> },
    /// Gracefully ends the session.
    Shutdown,
}

/// Runs the steady-state session loop: reads server PDUs, renders updates
/// into the framebuffer and forwards them to the display sink, and writes
/// input events supplied through `outbound`.
pub async fn run_active_session<S, D, C>(
    framed: &mut Framed<S>,
    connection_result: ConnectionResult,
    display: &mut D,
    channels: &mut C,
    outbound: &mut mpsc::Receiver<OutboundMessage>,
) -> SessionResult<GracefulDisconnectReason>
where
    S: FramedRead + FramedWrite,
    D: DisplaySink,
    C: ChannelHandler,
{
    let (mut width, mut height, mut bpp) = negotiated_display_params(&connection_result.connection_activation);

    let mut image = DecodedImage::new(width, height);
    display.on_desktop_size_change(width, height, bpp);

    let mut active_stage = ActiveStage::new(connection_result);
    let mut keep_alive = tokio::time::interval(KEEP_ALIVE_INTERVAL);
    keep_alive.reset();

    let disconnect_reason = 'session: loop {
        tokio::select! {
            frame = framed.read_pdu() => {
                let (action, frame) = frame.map_err(|e| custom_session_err("read PDU", e))?;

                for output in active_stage.process(&mut image, action, &frame)? {
                    match output {
                        ActiveStageOutput::ResponseFrame(response) => {
                            framed.write_all(&response).await.map_err(|e| custom_session_err("write response", e))?;
                        }
                        ActiveStageOutput::GraphicsUpdate(region) => {
                            let pixels = image.extract_rect(&region);
                            display.on_bitmap(region, pixels);
                        }
                        ActiveStageOutput::PointerUpdate(update) => {
                            display.on_pointer_update(update);
                        }
                        ActiveStageOutput::ChannelOpened { name, channel_id } => {
                            channels.on_channel_open(&name, channel_id);
                        }
                        ActiveStageOutput::ChannelData { channel_id, data } => {
                            channels.on_channel_data(channel_id, &data);
                        }
                        ActiveStageOutput::ChannelClosed { channel_id } => {
                            channels.on_channel_close(channel_id);
                        }
                        ActiveStageOutput::DeactivateAll(mut activation) => {
                            // Execute the Deactivation-Reactivation sequence:
                            // drive the capabilities exchange and finalization
                            // again, then resume the session with the new
                            // desktop size.
                            debug!("Received Server Deactivate All PDU, executing Deactivation-Reactivation Sequence");

                            (width, height, bpp) = drive_reactivation(framed, &mut activation).await?;

                            image = DecodedImage::new(width, height);
                            display.on_desktop_size_change(width, height, bpp);

                            active_stage.set_connection_activation(*activation);
                        }
                        ActiveStageOutput::Terminate(reason) => {
                            break 'session reason;
                        }
                    }
                }
            }
            message = outbound.recv() => {
                let Some(message) = message else {
                    // The input source is gone; tear the session down.
                    let frame = active_stage.graceful_shutdown()?;
                    framed.write_all(&frame).await.map_err(|e| custom_session_err("write disconnect", e))?;
                    break 'session GracefulDisconnectReason::UserInitiated;
                };

                match message {
                    OutboundMessage::Input(events) => {
                        if events.is_empty() {
                            continue;
                        }

                        let frame = active_stage.encode_input(events)?;
                        framed.write_all(&frame).await.map_err(|e| custom_session_err("write input", e))?;
                    }
                    OutboundMessage::ChannelData { channel_id, data } => {
                        let mut buf = WriteBuf::new();
                        active_stage.encode_dynamic(&mut buf, channel_id, &data)?;
                        framed.write_all(buf.filled()).await.map_err(|e| custom_session_err("write channel data", e))?;
                    }
                    OutboundMessage::Shutdown => {
                        let frame = active_stage.graceful_shutdown()?;
                        framed.write_all(&frame).await.map_err(|e| custom_session_err("write disconnect", e))?;
                        break 'session GracefulDisconnectReason::UserInitiated;
                    }
                }
            }
            _ = keep_alive.tick() => {
                let frame = active_stage.encode_input(vec![FastPathInputEvent::SyncEvent(SynchronizeFlags::empty())])?;
                framed.write_all(&frame).await.map_err(|e| custom_session_err("write keep-alive", e))?;
            }
        }
    };

    display.on_disconnect(&disconnect_reason.to_string());

    Ok(disconnect_reason)
}

async fn drive_reactivation<S>(
    framed: &mut Framed<S>,
    activation: &mut ConnectionActivationSequence,
) -> SessionResult<(u16, u16, u16)>
where
    S: FramedRead + FramedWrite,
{
    let mut buf = WriteBuf::new();

    loop {
        single_sequence_step(framed, activation, &mut buf)
            .await
            .map_err(SessionError::connector)?;

        if let ConnectionActivationState::Finalized {
            desktop_size,
            bits_per_pixel,
            ..
        } = &activation.state
        {
            return Ok((desktop_size.width, desktop_size.height, *bits_per_pixel));
        }
    }
}

fn negotiated_display_params(activation: &ConnectionActivationSequence) -> (u16, u16, u16) {
    match &activation.state {
        ConnectionActivationState::Finalized {
            desktop_size,
            bits_per_pixel,
            ..
        } => (desktop_size.width, desktop_size.height, *bits_per_pixel),
        _ => (0, 0, 32),
    }
}

fn custom_session_err(context: &'static str, e: std::io::Error) -> SessionError {
    SessionError::custom(context, e)
}
