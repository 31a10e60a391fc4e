//! Slow-path (X.224) processing in steady state: share-data PDUs on the I/O
//! channel, and the dynamic virtual channel multiplexer carried over the
//! DRDYNVC static channel.

use std::collections::HashMap;

use cobalt_connector::io_channel::{self, SendDataIndicationCtx};
use cobalt_core::WriteBuf;
use cobalt_graphics::zgfx;
use cobalt_pdu::dvc;
use cobalt_pdu::gcc::ChannelName;
use cobalt_pdu::mcs::{DisconnectProviderUltimatum, DisconnectReason, McsMessage};
use cobalt_pdu::rdp::headers::{ShareControlPdu, ShareDataPdu};
use cobalt_pdu::rdp::server_error_info::{ErrorInfo, ProtocolIndependentCode, ServerSetErrorInfoPdu};
use cobalt_pdu::rdp::vc;
use cobalt_pdu::x224::X224;

use crate::{SessionError, SessionErrorExt as _, SessionResult};

/// The name of the static channel carrying dynamic virtual channels.
pub const DRDYNVC_CHANNEL_NAME: ChannelName = ChannelName::from_static(b"drdynvc\0");

/// X224 Processor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorOutput {
    /// A buffer with encoded data to send to the server.
    ResponseFrame(Vec<u8>),
    /// A graceful disconnect notification; the caller closes the connection.
    Disconnect(DisconnectReason),
    /// The server requested deactivation: the caller re-runs the
    /// capabilities exchange and finalization, then resumes the session.
    DeactivateAll,
    /// A dynamic virtual channel was opened.
    ChannelOpened { name: String, channel_id: u32 },
    /// A fully reassembled (and decompressed, when applicable) dynamic
    /// virtual channel message.
    ChannelData { channel_id: u32, data: Vec<u8> },
    /// A dynamic virtual channel was closed by the server.
    ChannelClosed { channel_id: u32 },
}

pub struct Processor {
    user_channel_id: u16,
    io_channel_id: u16,
    drdynvc_channel_id: Option<u16>,
    dynamic_channels: HashMap<u32, DynamicChannel>,
    channel_map: HashMap<String, u32>,
    /// ZGFX history is a logical stream across channel payloads; exclusively
    /// held by the reader.
    zgfx: zgfx::Decompressor,
}

impl Processor {
    pub fn new(user_channel_id: u16, io_channel_id: u16, drdynvc_channel_id: Option<u16>) -> Self {
        Self {
            user_channel_id,
            io_channel_id,
            drdynvc_channel_id,
            dynamic_channels: HashMap::new(),
            channel_map: HashMap::new(),
            zgfx: zgfx::Decompressor::new(),
        }
    }

    /// Looks up a dynamic channel ID by name.
    pub fn channel_id_by_name(&self, channel_name: &str) -> Option<u32> {
        self.channel_map.get(channel_name).copied()
    }

    /// Processes a received X.224 frame. The returned outputs must be
    /// handled by the caller in order.
    pub fn process(&mut self, frame: &[u8]) -> SessionResult<Vec<ProcessorOutput>> {
        let data_ctx: SendDataIndicationCtx<'_> =
            io_channel::decode_send_data_indication(frame).map_err(SessionError::connector)?;
        let channel_id = data_ctx.channel_id;

        if channel_id == self.io_channel_id {
            self.process_io_channel(data_ctx)
        } else if self.drdynvc_channel_id == Some(channel_id) {
            self.process_dvc(data_ctx)
        } else {
            warn!(channel_id, "Received a PDU on an unexpected static channel");
            Ok(Vec::new())
        }
    }

    fn process_io_channel(&self, data_ctx: SendDataIndicationCtx<'_>) -> SessionResult<Vec<ProcessorOutput>> {
        debug_assert_eq!(data_ctx.channel_id, self.io_channel_id);

        let ctx = io_channel::decode_share_control(data_ctx).map_err(SessionError::connector)?;

        match ctx.pdu {
            ShareControlPdu::ServerDeactivateAll(_) => {
                debug!("Received Server Deactivate All PDU");
                Ok(vec![ProcessorOutput::DeactivateAll])
            }
            ShareControlPdu::Data(header) => match header.share_data_pdu {
                ShareDataPdu::SaveSessionInfo(session_info) => {
                    debug!(?session_info, "Got Save Session Info PDU");
                    Ok(Vec::new())
                }
                ShareDataPdu::ServerSetErrorInfo(ServerSetErrorInfoPdu(ErrorInfo::ProtocolIndependentCode(
                    ProtocolIndependentCode::None,
                ))) => {
                    debug!("Received None server error");
                    Ok(Vec::new())
                }
                ShareDataPdu::ServerSetErrorInfo(ServerSetErrorInfoPdu(e)) => {
                    // Part of the server-side graceful disconnect procedure;
                    // the error code is surfaced verbatim on disconnect.
                    let graceful_disconnect = error_info_to_graceful_disconnect_reason(&e);

                    if let Some(reason) = graceful_disconnect {
                        debug!("Received server-side graceful disconnect request: {reason}");

                        Ok(vec![ProcessorOutput::Disconnect(reason)])
                    } else {
                        Err(reason_err!("ServerSetErrorInfo", "{}", e.description()))
                    }
                }
                ShareDataPdu::ShutdownDenied => {
                    debug!("ShutdownDenied received, the session will be closed");

                    // The client acknowledges with a disconnect ultimatum
                    // before dropping the connection.
                    let ultimatum = McsMessage::DisconnectProviderUltimatum(DisconnectProviderUltimatum::from_reason(
                        DisconnectReason::UserRequested,
                    ));

                    let encoded_pdu = cobalt_core::encode_vec(&X224(ultimatum)).map_err(SessionError::encode)?;

                    Ok(vec![
                        ProcessorOutput::ResponseFrame(encoded_pdu),
                        ProcessorOutput::Disconnect(DisconnectReason::UserRequested),
                    ])
                }
                pdu => {
                    debug!(name = pdu.as_short_name(), "Unhandled I/O channel PDU");
                    Ok(Vec::new())
                }
            },
            pdu => Err(reason_err!(
                "IO channel",
                "unexpected Share Control PDU: {}",
                pdu.as_short_name()
            )),
        }
    }

    fn process_dvc(&mut self, data_ctx: SendDataIndicationCtx<'_>) -> SessionResult<Vec<ProcessorOutput>> {
        debug_assert_eq!(Some(data_ctx.channel_id), self.drdynvc_channel_id);

        let mut user_data = cobalt_core::ReadCursor::new(data_ctx.user_data);

        let channel_header: vc::ChannelPduHeader =
            cobalt_core::decode_cursor(&mut user_data).map_err(SessionError::decode)?;
        let dvc_data_size = user_data.len();

        let dvc_pdu =
            dvc::ServerPdu::decode(&mut user_data, dvc_data_size).map_err(SessionError::decode)?;
        trace!(?channel_header, ?dvc_pdu, "Received DVC PDU");

        let mut outputs = Vec::new();
        let mut buf = WriteBuf::new();

        match dvc_pdu {
            dvc::ServerPdu::CapabilitiesRequest(caps_request) => {
                debug!("Got DVC Capabilities Request PDU: {caps_request:?}");
                let caps_response = dvc::ClientPdu::CapabilitiesResponse(dvc::CapabilitiesResponsePdu {
                    version: dvc::CapsVersion::V1,
                });

                debug!("Send DVC Capabilities Response PDU: {caps_response:?}");
                self.encode_dvc_message(caps_response, &mut buf)?;
            }
            dvc::ServerPdu::CreateRequest(create_request) => {
                debug!("Got DVC Create Request PDU: {create_request:?}");

                self.dynamic_channels.insert(
                    create_request.channel_id,
                    DynamicChannel::new(create_request.channel_id, create_request.channel_id_type),
                );
                self.channel_map
                    .insert(create_request.channel_name.clone(), create_request.channel_id);

                let create_response = dvc::ClientPdu::CreateResponse(dvc::CreateResponsePdu {
                    channel_id_type: create_request.channel_id_type,
                    channel_id: create_request.channel_id,
                    creation_status: dvc::DVC_CREATION_STATUS_OK,
                });

                debug!("Send DVC Create Response PDU: {create_response:?}");
                self.encode_dvc_message(create_response, &mut buf)?;

                outputs.push(ProcessorOutput::ChannelOpened {
                    name: create_request.channel_name,
                    channel_id: create_request.channel_id,
                });
            }
            dvc::ServerPdu::CloseRequest(close_request) => {
                debug!("Got DVC Close Request PDU: {close_request:?}");

                if self.dynamic_channels.remove(&close_request.channel_id).is_some() {
                    let close_response = dvc::ClientPdu::CloseResponse(dvc::ClosePdu {
                        channel_id_type: close_request.channel_id_type,
                        channel_id: close_request.channel_id,
                    });

                    debug!("Send DVC Close Response PDU: {close_response:?}");
                    self.encode_dvc_message(close_response, &mut buf)?;

                    self.channel_map.retain(|_, id| *id != close_request.channel_id);

                    outputs.push(ProcessorOutput::ChannelClosed {
                        channel_id: close_request.channel_id,
                    });
                } else {
                    warn!(channel_id = close_request.channel_id, "Close request for an unknown DVC");
                }
            }
            dvc::ServerPdu::DataFirst(data) => {
                if let Some(complete) = self.process_data_first(&data, None)? {
                    outputs.push(complete);
                }
            }
            dvc::ServerPdu::Data(data) => {
                if let Some(complete) = self.process_data(&data, None)? {
                    outputs.push(complete);
                }
            }
            dvc::ServerPdu::DataFirstCompressed(data) => {
                let mut decompressed = Vec::new();
                self.zgfx
                    .decompress(&data.data, &mut decompressed)
                    .map_err(|e| custom_err!("zgfx", e))?;

                if let Some(complete) = self.process_data_first(&data, Some(decompressed))? {
                    outputs.push(complete);
                }
            }
            dvc::ServerPdu::DataCompressed(data) => {
                let mut decompressed = Vec::new();
                self.zgfx
                    .decompress(&data.data, &mut decompressed)
                    .map_err(|e| custom_err!("zgfx", e))?;

                if let Some(complete) = self.process_data(&data, Some(decompressed))? {
                    outputs.push(complete);
                }
            }
            dvc::ServerPdu::SoftSyncRequest(soft_sync) => {
                debug!("Got DVC Soft-Sync Request PDU: {soft_sync:?}");

                let soft_sync_response = dvc::ClientPdu::SoftSyncResponse(dvc::SoftSyncResponsePdu {
                    tunnels: Vec::new(),
                });

                debug!("Send DVC Soft-Sync Response PDU: {soft_sync_response:?}");
                self.encode_dvc_message(soft_sync_response, &mut buf)?;
            }
        }

        if !buf.is_empty() {
            outputs.insert(0, ProcessorOutput::ResponseFrame(buf.into_inner()));
        }

        Ok(outputs)
    }

    fn process_data_first(
        &mut self,
        data: &dvc::DataFirstPdu,
        decompressed: Option<Vec<u8>>,
    ) -> SessionResult<Option<ProcessorOutput>> {
        let payload = decompressed.unwrap_or_else(|| data.data.clone());

        let Some(channel) = self.dynamic_channels.get_mut(&data.channel_id) else {
            warn!(channel_id = data.channel_id, "Data-first PDU for a closed DVC, dropping");
            return Ok(None);
        };

        Ok(channel
            .process_data_first_pdu(data.total_data_size as usize, payload)
            .map(|data| ProcessorOutput::ChannelData {
                channel_id: channel.channel_id,
                data,
            }))
    }

    fn process_data(&mut self, data: &dvc::DataPdu, decompressed: Option<Vec<u8>>) -> SessionResult<Option<ProcessorOutput>> {
        let payload = decompressed.unwrap_or_else(|| data.data.clone());

        let Some(channel) = self.dynamic_channels.get_mut(&data.channel_id) else {
            warn!(channel_id = data.channel_id, "Data PDU for a closed DVC, dropping");
            return Ok(None);
        };

        Ok(channel.process_data_pdu(payload).map(|data| ProcessorOutput::ChannelData {
            channel_id: channel.channel_id,
            data,
        }))
    }

    /// Sends opaque data on an open dynamic channel.
    pub fn encode_dynamic(&self, output: &mut WriteBuf, channel_id: u32, dvc_data: &[u8]) -> SessionResult<()> {
        let channel = self
            .dynamic_channels
            .get(&channel_id)
            .ok_or_else(|| reason_err!("DVC", "access to non existing channel: {}", channel_id))?;

        let dvc_client_data = dvc::ClientPdu::Data(dvc::DataPdu {
            channel_id_type: channel.channel_id_type,
            channel_id: channel.channel_id,
            data: dvc_data.to_vec(),
        });

        self.encode_dvc_message(dvc_client_data, output)?;

        Ok(())
    }

    /// Sends a PDU on the static global channel, typically input events.
    pub fn encode_static(&self, output: &mut WriteBuf, pdu: ShareDataPdu) -> SessionResult<usize> {
        let written = io_channel::encode_share_data(self.user_channel_id, self.io_channel_id, 0, pdu, output)
            .map_err(SessionError::connector)?;
        Ok(written)
    }

    fn encode_dvc_message(&self, pdu: dvc::ClientPdu, buf: &mut WriteBuf) -> SessionResult<()> {
        let drdynvc_channel_id = self
            .drdynvc_channel_id
            .ok_or_else(|| general_err!("dynamic virtual channel not connected"))?;

        let dvc_payload = cobalt_core::encode_vec(&pdu).map_err(SessionError::encode)?;

        let channel_header = vc::ChannelPduHeader {
            length: dvc_payload.len() as u32,
            flags: vc::ChannelControlFlags::FLAG_FIRST | vc::ChannelControlFlags::FLAG_LAST,
        };

        let mut user_data = cobalt_core::encode_vec(&channel_header).map_err(SessionError::encode)?;
        user_data.extend_from_slice(&dvc_payload);

        io_channel::encode_send_data_request(self.user_channel_id, drdynvc_channel_id, &user_data, buf)
            .map_err(SessionError::connector)?;

        Ok(())
    }
}

struct DynamicChannel {
    channel_id: u32,
    channel_id_type: dvc::FieldType,
    data: CompleteData,
}

impl DynamicChannel {
    fn new(channel_id: u32, channel_id_type: dvc::FieldType) -> Self {
        Self {
            channel_id,
            channel_id_type,
            data: CompleteData::new(),
        }
    }

    fn process_data_first_pdu(&mut self, total_data_size: usize, data: Vec<u8>) -> Option<Vec<u8>> {
        self.data.process_data_first_pdu(total_data_size, data)
    }

    fn process_data_pdu(&mut self, data: Vec<u8>) -> Option<Vec<u8>> {
        self.data.process_data_pdu(data)
    }
}

/// DVC message reassembly: a data-first PDU declares the total size, data
/// PDUs append until the sum matches.
#[derive(Debug, PartialEq)]
struct CompleteData {
    total_size: usize,
    data: Vec<u8>,
}

impl CompleteData {
    fn new() -> Self {
        Self {
            total_size: 0,
            data: Vec::new(),
        }
    }

    fn process_data_first_pdu(&mut self, total_data_size: usize, data: Vec<u8>) -> Option<Vec<u8>> {
        if self.total_size != 0 || !self.data.is_empty() {
            // A data-first on a channel with an in-progress reassembly
            // overwrites the prior buffer.
            warn!("Incomplete DVC message, it will be skipped");
            self.data.clear();
            self.total_size = 0;
        }

        if total_data_size == data.len() {
            Some(data)
        } else {
            self.total_size = total_data_size;
            self.data = data;

            None
        }
    }

    fn process_data_pdu(&mut self, mut data: Vec<u8>) -> Option<Vec<u8>> {
        if self.total_size == 0 && self.data.is_empty() {
            // Message is not fragmented.
            return Some(data);
        }

        // Message is fragmented, reassemble it.
        let actual_data_length = self.data.len() + data.len();

        match actual_data_length.cmp(&self.total_size) {
            core::cmp::Ordering::Less => {
                self.data.append(&mut data);
                None
            }
            core::cmp::Ordering::Equal => {
                self.total_size = 0;
                self.data.append(&mut data);
                Some(core::mem::take(&mut self.data))
            }
            core::cmp::Ordering::Greater => {
                warn!("Actual DVC message size is grater than the expected total size");
                self.total_size = 0;
                self.data.clear();

                None
            }
        }
    }
}

/// Converts a [`ServerSetErrorInfoPdu`] code into a graceful
/// [`DisconnectReason`] when the code describes one.
pub fn error_info_to_graceful_disconnect_reason(error_info: &ErrorInfo) -> Option<DisconnectReason> {
    let code = if let ErrorInfo::ProtocolIndependentCode(code) = error_info {
        code
    } else {
        return None;
    };

    match code {
        ProtocolIndependentCode::RpcInitiatedDisconnect
        | ProtocolIndependentCode::RpcInitiatedLogoff
        | ProtocolIndependentCode::DisconnectedByOtherConnection => Some(DisconnectReason::ProviderInitiated),
        ProtocolIndependentCode::RpcInitiatedDisconnectByUser | ProtocolIndependentCode::LogoffByUser => {
            Some(DisconnectReason::UserRequested)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dvc_reassembly_concatenates_until_total_size() {
        let mut complete_data = CompleteData::new();

        assert_eq!(complete_data.process_data_first_pdu(10, vec![0, 1, 2, 3]), None);
        assert_eq!(
            complete_data.process_data_pdu(vec![4, 5, 6, 7, 8, 9]),
            Some(vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9])
        );
    }

    #[test]
    fn dvc_data_first_overwrites_pending_reassembly() {
        let mut complete_data = CompleteData::new();

        assert_eq!(complete_data.process_data_first_pdu(10, vec![0, 1, 2, 3]), None);
        assert_eq!(complete_data.process_data_first_pdu(4, vec![9, 9, 9, 9]), Some(vec![9, 9, 9, 9]));
    }

    #[test]
    fn unfragmented_dvc_data_passes_through() {
        let mut complete_data = CompleteData::new();

        assert_eq!(complete_data.process_data_pdu(vec![1, 2, 3]), Some(vec![1, 2, 3]));
    }
}
