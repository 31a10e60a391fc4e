use cobalt_connector::connection_activation::ConnectionActivationSequence;
use cobalt_connector::ConnectionResult;
use cobalt_core::WriteBuf;
use cobalt_pdu::geometry::InclusiveRectangle;
use cobalt_pdu::input::fast_path::{FastPathInput, FastPathInputEvent};
use cobalt_pdu::mcs::DisconnectReason;
use cobalt_pdu::rdp::headers::ShareDataPdu;
use cobalt_pdu::x224::{DisconnectRequest, X224};
use cobalt_pdu::Action;

use crate::image::DecodedImage;
use crate::pointer::PointerUpdate;
use crate::{fast_path, x224, SessionErrorExt as _, SessionResult};

/// The steady-state stage of a session: dispatches incoming frames to the
/// fast-path or X.224 processors and encodes outgoing input events.
pub struct ActiveStage {
    x224_processor: x224::Processor,
    fast_path_processor: fast_path::Processor,
    /// Kept for the Deactivation-Reactivation sequence.
    connection_activation: ConnectionActivationSequence,
}

impl ActiveStage {
    pub fn new(connection_result: ConnectionResult) -> Self {
        use cobalt_connector::connection_activation::ConnectionActivationState;

        let drdynvc_channel_id = connection_result.channel_id_by_name(&x224::DRDYNVC_CHANNEL_NAME);

        let x224_processor = x224::Processor::new(
            connection_result.user_channel_id,
            connection_result.io_channel_id,
            drdynvc_channel_id,
        );

        let frame_ack_negotiated = matches!(
            connection_result.connection_activation.state,
            ConnectionActivationState::Finalized {
                frame_ack_negotiated: true,
                ..
            }
        );

        let fast_path_processor = fast_path::ProcessorBuilder {
            io_channel_id: connection_result.io_channel_id,
            user_channel_id: connection_result.user_channel_id,
            frame_ack_negotiated,
        }
        .build();

        Self {
            x224_processor,
            fast_path_processor,
            connection_activation: connection_result.connection_activation,
        }
    }

    /// Processes one framed PDU received from the server.
    pub fn process(
        &mut self,
        image: &mut DecodedImage,
        action: Action,
        frame: &[u8],
    ) -> SessionResult<Vec<ActiveStageOutput>> {
        let mut stage_outputs = Vec::new();

        match action {
            Action::FastPath => {
                let mut output = WriteBuf::new();
                let result = self.fast_path_processor.process(image, frame, &mut output)?;

                if !output.is_empty() {
                    stage_outputs.push(ActiveStageOutput::ResponseFrame(output.into_inner()));
                }

                if let Some(update_region) = result.update_region {
                    stage_outputs.push(ActiveStageOutput::GraphicsUpdate(update_region));
                }

                for pointer_update in result.pointer_updates {
                    stage_outputs.push(ActiveStageOutput::PointerUpdate(pointer_update));
                }
            }
            Action::X224 => {
                for output in self.x224_processor.process(frame)? {
                    match output {
                        x224::ProcessorOutput::ResponseFrame(frame) => {
                            stage_outputs.push(ActiveStageOutput::ResponseFrame(frame));
                        }
                        x224::ProcessorOutput::Disconnect(reason) => {
                            stage_outputs.push(ActiveStageOutput::Terminate(GracefulDisconnectReason::from(reason)));
                        }
                        x224::ProcessorOutput::DeactivateAll => {
                            stage_outputs.push(ActiveStageOutput::DeactivateAll(Box::new(
                                self.connection_activation.reset_clone(),
                            )));
                        }
                        x224::ProcessorOutput::ChannelOpened { name, channel_id } => {
                            stage_outputs.push(ActiveStageOutput::ChannelOpened { name, channel_id });
                        }
                        x224::ProcessorOutput::ChannelData { channel_id, data } => {
                            stage_outputs.push(ActiveStageOutput::ChannelData { channel_id, data });
                        }
                        x224::ProcessorOutput::ChannelClosed { channel_id } => {
                            stage_outputs.push(ActiveStageOutput::ChannelClosed { channel_id });
                        }
                    }
                }
            }
        }

        Ok(stage_outputs)
    }

    /// Called after the Deactivation-Reactivation sequence completed with a
    /// (possibly different) desktop size.
    pub fn set_connection_activation(&mut self, connection_activation: ConnectionActivationSequence) {
        self.connection_activation = connection_activation;
    }

    /// Encodes client fast-path input events.
    pub fn encode_input(&self, events: Vec<FastPathInputEvent>) -> SessionResult<Vec<u8>> {
        cobalt_core::encode_vec(&FastPathInput(events)).map_err(crate::SessionError::encode)
    }

    /// Encodes a PDU on the static global channel.
    pub fn encode_static(&self, output: &mut WriteBuf, pdu: ShareDataPdu) -> SessionResult<usize> {
        self.x224_processor.encode_static(output, pdu)
    }

    /// Sends opaque data on an open dynamic channel.
    pub fn encode_dynamic(&self, output: &mut WriteBuf, channel_id: u32, dvc_data: &[u8]) -> SessionResult<()> {
        self.x224_processor.encode_dynamic(output, channel_id, dvc_data)
    }

    /// Looks up a dynamic channel ID by name.
    pub fn dynamic_channel_id_by_name(&self, channel_name: &str) -> Option<u32> {
        self.x224_processor.channel_id_by_name(channel_name)
    }

    /// Encodes the graceful exit sequence: an X.224 disconnect request.
    pub fn graceful_shutdown(&self) -> SessionResult<Vec<u8>> {
        cobalt_core::encode_vec(&X224(DisconnectRequest)).map_err(crate::SessionError::encode)
    }
}

/// The outcome of processing one incoming frame.
#[derive(Debug)]
pub enum ActiveStageOutput {
    /// Bytes to send back to the server.
    ResponseFrame(Vec<u8>),
    /// The framebuffer region that was updated.
    GraphicsUpdate(InclusiveRectangle),
    /// A cursor change or move.
    PointerUpdate(PointerUpdate),
    /// A dynamic virtual channel was opened.
    ChannelOpened { name: String, channel_id: u32 },
    /// A reassembled dynamic virtual channel message.
    ChannelData { channel_id: u32, data: Vec<u8> },
    /// A dynamic virtual channel was closed.
    ChannelClosed { channel_id: u32 },
    /// The server requested deactivation; drive the returned sequence to
    /// completion, resize the framebuffer, and resume the session.
    DeactivateAll(Box<ConnectionActivationSequence>),
    /// The session ended.
    Terminate(GracefulDisconnectReason),
}

/// Reasons for graceful session termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GracefulDisconnectReason {
    UserInitiated,
    ServerInitiated,
    Other(&'static str),
}

impl From<DisconnectReason> for GracefulDisconnectReason {
    fn from(reason: DisconnectReason) -> Self {
        match reason {
            DisconnectReason::UserRequested => GracefulDisconnectReason::UserInitiated,
            DisconnectReason::ProviderInitiated => GracefulDisconnectReason::ServerInitiated,
            _ => GracefulDisconnectReason::Other(reason.description()),
        }
    }
}

impl core::fmt::Display for GracefulDisconnectReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            GracefulDisconnectReason::UserInitiated => write!(f, "user initiated"),
            GracefulDisconnectReason::ServerInitiated => write!(f, "server initiated"),
            GracefulDisconnectReason::Other(description) => write!(f, "other ({description})"),
        }
    }
}
