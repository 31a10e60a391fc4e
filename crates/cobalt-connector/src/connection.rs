use core::mem;

use cobalt_core::{decode, WriteBuf};
use cobalt_pdu::gcc::{ChannelDef, ChannelName, ChannelOptions};
use cobalt_pdu::x224::{X224, X224Data};
use cobalt_pdu::{gcc, mcs, nego, rdp, PduHint};

use crate::channel_connection::{ChannelConnectionSequence, ChannelConnectionState};
use crate::connection_activation::{ConnectionActivationSequence, ConnectionActivationState};
use crate::license_exchange::LicenseExchangeSequence;
use crate::{
    encode_x224_packet, Config, ConnectorError, ConnectorErrorExt as _, ConnectorErrorKind, ConnectorResult,
    DesktopSize, Sequence, State, Written,
};

/// The negotiated outcome of a successful connection sequence.
#[derive(Debug)]
pub struct ConnectionResult {
    pub io_channel_id: u16,
    pub user_channel_id: u16,
    /// MCS channel IDs assigned to the static channels requested by the
    /// client, in request order.
    pub static_channels: Vec<(ChannelName, u16)>,
    pub desktop_size: DesktopSize,
    /// The share ID and negotiated capability sets live inside; reused for
    /// the Deactivation-Reactivation sequence.
    pub connection_activation: ConnectionActivationSequence,
}

impl ConnectionResult {
    pub fn channel_id_by_name(&self, name: &ChannelName) -> Option<u16> {
        self.static_channels
            .iter()
            .find(|(channel_name, _)| channel_name == name)
            .map(|(_, id)| *id)
    }
}

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum ClientConnectorState {
    #[default]
    Consumed,

    ConnectionInitiationSendRequest,
    ConnectionInitiationWaitConfirm {
        requested_protocol: nego::SecurityProtocol,
    },
    EnhancedSecurityUpgrade {
        selected_protocol: nego::SecurityProtocol,
    },
    Credssp {
        selected_protocol: nego::SecurityProtocol,
    },
    BasicSettingsExchangeSendInitial {
        selected_protocol: nego::SecurityProtocol,
    },
    BasicSettingsExchangeWaitResponse {
        connect_initial: mcs::ConnectInitial,
    },
    ChannelConnection {
        io_channel_id: u16,
        static_channel_ids: Vec<u16>,
        channel_connection: ChannelConnectionSequence,
    },
    SecureSettingsExchange {
        io_channel_id: u16,
        user_channel_id: u16,
        static_channel_ids: Vec<u16>,
    },
    LicensingExchange {
        io_channel_id: u16,
        user_channel_id: u16,
        static_channel_ids: Vec<u16>,
        license_exchange: LicenseExchangeSequence,
    },
    CapabilitiesExchange {
        static_channel_ids: Vec<u16>,
        connection_activation: ConnectionActivationSequence,
    },
    ConnectionFinalization {
        static_channel_ids: Vec<u16>,
        connection_activation: ConnectionActivationSequence,
    },
    Connected {
        result: ConnectionResult,
    },
}

impl State for ClientConnectorState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::ConnectionInitiationSendRequest => "ConnectionInitiationSendRequest",
            Self::ConnectionInitiationWaitConfirm { .. } => "ConnectionInitiationWaitConfirm",
            Self::EnhancedSecurityUpgrade { .. } => "EnhancedSecurityUpgrade",
            Self::Credssp { .. } => "Credssp",
            Self::BasicSettingsExchangeSendInitial { .. } => "BasicSettingsExchangeSendInitial",
            Self::BasicSettingsExchangeWaitResponse { .. } => "BasicSettingsExchangeWaitResponse",
            Self::ChannelConnection { .. } => "ChannelConnection",
            Self::SecureSettingsExchange { .. } => "SecureSettingsExchange",
            Self::LicensingExchange { .. } => "LicensingExchange",
            Self::CapabilitiesExchange { connection_activation, .. } => connection_activation.state().name(),
            Self::ConnectionFinalization { connection_activation, .. } => connection_activation.state().name(),
            Self::Connected { .. } => "Connected",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

/// The client connection sequence state machine.
#[derive(Debug)]
pub struct ClientConnector {
    pub config: Config,
    pub state: ClientConnectorState,
    /// The IP address of the client, sent in the Client Info PDU.
    pub client_addr: String,
    static_channels: Vec<ChannelName>,
}

impl ClientConnector {
    pub fn new(config: Config, client_addr: String) -> Self {
        Self {
            config,
            state: ClientConnectorState::ConnectionInitiationSendRequest,
            client_addr,
            static_channels: Vec::new(),
        }
    }

    /// Requests a static virtual channel by name.
    #[must_use]
    pub fn with_static_channel(mut self, name: ChannelName) -> Self {
        self.static_channels.push(name);
        self
    }

    pub fn attach_static_channel(&mut self, name: ChannelName) {
        self.static_channels.push(name);
    }

    pub fn should_perform_security_upgrade(&self) -> bool {
        matches!(self.state, ClientConnectorState::EnhancedSecurityUpgrade { .. })
    }

    /// Marks the TLS upgrade as done; the caller performed it on the
    /// transport.
    pub fn mark_security_upgrade_as_done(&mut self) -> ConnectorResult<()> {
        if !self.should_perform_security_upgrade() {
            return Err(general_err!("security upgrade is not expected in this state"));
        }

        self.step(&[], &mut WriteBuf::new())?;
        debug_assert!(!self.should_perform_security_upgrade());

        Ok(())
    }

    pub fn should_perform_credssp(&self) -> bool {
        matches!(self.state, ClientConnectorState::Credssp { .. })
    }

    /// Marks the CredSSP exchange as done; the caller performed it on the
    /// upgraded transport.
    pub fn mark_credssp_as_done(&mut self) -> ConnectorResult<()> {
        if !self.should_perform_credssp() {
            return Err(general_err!("CredSSP is not expected in this state"));
        }

        let res = self.step(&[], &mut WriteBuf::new())?;
        debug_assert!(!self.should_perform_credssp());
        debug_assert!(res.is_nothing());

        Ok(())
    }
}

impl Sequence for ClientConnector {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match &self.state {
            ClientConnectorState::Consumed => None,
            ClientConnectorState::ConnectionInitiationSendRequest => None,
            ClientConnectorState::ConnectionInitiationWaitConfirm { .. } => Some(&cobalt_pdu::X224_HINT),
            ClientConnectorState::EnhancedSecurityUpgrade { .. } => None,
            ClientConnectorState::Credssp { .. } => None,
            ClientConnectorState::BasicSettingsExchangeSendInitial { .. } => None,
            ClientConnectorState::BasicSettingsExchangeWaitResponse { .. } => Some(&cobalt_pdu::X224_HINT),
            ClientConnectorState::ChannelConnection { channel_connection, .. } => channel_connection.next_pdu_hint(),
            ClientConnectorState::SecureSettingsExchange { .. } => None,
            ClientConnectorState::LicensingExchange { license_exchange, .. } => license_exchange.next_pdu_hint(),
            ClientConnectorState::CapabilitiesExchange { connection_activation, .. } => {
                connection_activation.next_pdu_hint()
            }
            ClientConnectorState::ConnectionFinalization { connection_activation, .. } => {
                connection_activation.next_pdu_hint()
            }
            ClientConnectorState::Connected { .. } => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            // Invalid state
            ClientConnectorState::Consumed => {
                return Err(general_err!("connector sequence state is consumed (this is a bug)"))
            }

            //== Connection Initiation ==//
            // Exchange the supported security protocols and a few other
            // connection flags.
            ClientConnectorState::ConnectionInitiationSendRequest => {
                debug!("Connection Initiation");

                let mut security_protocol = nego::SecurityProtocol::empty();

                if self.config.enable_tls {
                    security_protocol.insert(nego::SecurityProtocol::SSL);
                }

                if self.config.enable_credssp {
                    security_protocol.insert(nego::SecurityProtocol::HYBRID | nego::SecurityProtocol::HYBRID_EX);
                }

                if security_protocol.is_standard_rdp_security() {
                    return Err(reason_err!("Initiation", "standard RDP security is not supported"));
                }

                let connection_request = nego::ConnectionRequest {
                    nego_data: self.config.request_data.clone().or_else(|| {
                        Some(nego::NegoRequestData::cookie(
                            self.config.credentials.username.clone(),
                        ))
                    }),
                    flags: nego::RequestFlags::empty(),
                    protocol: security_protocol,
                };

                debug!(message = ?connection_request, "Send");

                let written = cobalt_core::encode_buf(&X224(connection_request), output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::ConnectionInitiationWaitConfirm {
                        requested_protocol: security_protocol,
                    },
                )
            }
            ClientConnectorState::ConnectionInitiationWaitConfirm { requested_protocol } => {
                let connection_confirm = decode::<X224<nego::ConnectionConfirm>>(input)
                    .map_err(ConnectorError::decode)
                    .map(|p| p.0)?;

                debug!(message = ?connection_confirm, "Received");

                let (flags, selected_protocol) = match connection_confirm {
                    nego::ConnectionConfirm::Response { flags, protocol } => (flags, protocol),
                    nego::ConnectionConfirm::Failure { code } => {
                        error!(?code, "Received connection failure code");
                        return Err(ConnectorError::new(
                            "negotiation failure",
                            ConnectorErrorKind::Negotiation(code),
                        ));
                    }
                };

                info!(?selected_protocol, ?flags, "Server confirmed connection");

                if !selected_protocol.intersects(requested_protocol) {
                    return Err(reason_err!(
                        "Initiation",
                        "client advertised {requested_protocol}, but server selected {selected_protocol}",
                    ));
                }

                (
                    Written::Nothing,
                    ClientConnectorState::EnhancedSecurityUpgrade { selected_protocol },
                )
            }

            //== Upgrade to Enhanced RDP Security ==//
            // The caller matches this state and performs the TLS handshake on
            // the transport.
            ClientConnectorState::EnhancedSecurityUpgrade { selected_protocol } => {
                let next_state = if selected_protocol
                    .intersects(nego::SecurityProtocol::HYBRID | nego::SecurityProtocol::HYBRID_EX)
                {
                    debug!("Begin NLA using CredSSP");
                    ClientConnectorState::Credssp { selected_protocol }
                } else {
                    debug!("CredSSP is disabled, skipping NLA");
                    ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol }
                };

                (Written::Nothing, next_state)
            }

            //== CredSSP ==//
            // Performed by the caller on the upgraded transport.
            ClientConnectorState::Credssp { selected_protocol } => (
                Written::Nothing,
                ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol },
            ),

            //== Basic Settings Exchange ==//
            // Exchange the GCC blocks: Core Data, Security Data and Network Data.
            ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol } => {
                debug!("Basic Settings Exchange");

                let client_gcc_blocks = create_gcc_blocks(&self.config, selected_protocol, &self.static_channels);

                let connect_initial = mcs::ConnectInitial::with_gcc_blocks(client_gcc_blocks);

                debug!(message = ?connect_initial, "Send");

                let written = encode_x224_packet(&connect_initial, output)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::BasicSettingsExchangeWaitResponse { connect_initial },
                )
            }
            ClientConnectorState::BasicSettingsExchangeWaitResponse { connect_initial } => {
                let x224_payload = decode::<X224<X224Data<'_>>>(input)
                    .map_err(ConnectorError::decode)
                    .map(|p| p.0)?;
                let connect_response =
                    decode::<mcs::ConnectResponse>(x224_payload.data.as_ref()).map_err(ConnectorError::decode)?;

                debug!(message = ?connect_response, "Received");

                let client_gcc_blocks = &connect_initial.conference_create_request.gcc_blocks;

                let server_gcc_blocks = connect_response.conference_create_response.gcc_blocks;

                if client_gcc_blocks.security == gcc::ClientSecurityData::no_security()
                    && server_gcc_blocks.security != gcc::ServerSecurityData::no_security()
                {
                    return Err(general_err!("can't satisfy server security settings"));
                }

                if server_gcc_blocks.message_channel.is_some() {
                    warn!("Unexpected ServerMessageChannelData GCC block (not supported)");
                }

                if server_gcc_blocks.multi_transport_channel.is_some() {
                    warn!("Unexpected MultiTransportChannelData GCC block (not supported)");
                }

                let static_channel_ids = server_gcc_blocks.network.channel_ids;
                let io_channel_id = server_gcc_blocks.network.io_channel;

                debug!(?static_channel_ids, io_channel_id);

                (
                    Written::Nothing,
                    ClientConnectorState::ChannelConnection {
                        io_channel_id,
                        static_channel_ids: static_channel_ids.clone(),
                        channel_connection: ChannelConnectionSequence::new(io_channel_id, static_channel_ids),
                    },
                )
            }

            //== Channel Connection ==//
            // Connect every individual channel.
            ClientConnectorState::ChannelConnection {
                io_channel_id,
                static_channel_ids,
                mut channel_connection,
            } => {
                debug!("Channel Connection");
                let written = channel_connection.step(input, output)?;

                let next_state = if let ChannelConnectionState::AllJoined { user_channel_id } = channel_connection.state
                {
                    debug_assert!(channel_connection.state.is_terminal());

                    ClientConnectorState::SecureSettingsExchange {
                        io_channel_id,
                        user_channel_id,
                        static_channel_ids,
                    }
                } else {
                    ClientConnectorState::ChannelConnection {
                        io_channel_id,
                        static_channel_ids,
                        channel_connection,
                    }
                };

                (written, next_state)
            }

            //== Secure Settings Exchange ==//
            // Send the Client Info PDU (credentials, performance flags, etc).
            ClientConnectorState::SecureSettingsExchange {
                io_channel_id,
                user_channel_id,
                static_channel_ids,
            } => {
                debug!("Secure Settings Exchange");

                let client_info = create_client_info_pdu(&self.config, &self.client_addr);

                debug!(message = ?client_info, "Send");

                let written =
                    crate::io_channel::encode_send_data_request(user_channel_id, io_channel_id, &client_info, output)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::LicensingExchange {
                        io_channel_id,
                        user_channel_id,
                        static_channel_ids,
                        license_exchange: LicenseExchangeSequence::new(io_channel_id),
                    },
                )
            }

            //== Licensing ==//
            // The server concludes the licensing phase; only a License Error
            // PDU with STATUS_VALID_CLIENT lets the connection proceed.
            ClientConnectorState::LicensingExchange {
                io_channel_id,
                user_channel_id,
                static_channel_ids,
                mut license_exchange,
            } => {
                debug!("Licensing Exchange");

                let written = license_exchange.step(input, output)?;

                let next_state = if license_exchange.state.is_terminal() {
                    ClientConnectorState::CapabilitiesExchange {
                        static_channel_ids,
                        connection_activation: ConnectionActivationSequence::new(
                            self.config.clone(),
                            io_channel_id,
                            user_channel_id,
                        ),
                    }
                } else {
                    ClientConnectorState::LicensingExchange {
                        io_channel_id,
                        user_channel_id,
                        static_channel_ids,
                        license_exchange,
                    }
                };

                (written, next_state)
            }

            //== Capabilities Exchange ==//
            // The server sends its capability sets; the client answers with
            // Confirm Active.
            ClientConnectorState::CapabilitiesExchange {
                static_channel_ids,
                mut connection_activation,
            } => {
                let written = connection_activation.step(input, output)?;
                match connection_activation.state {
                    ConnectionActivationState::ConnectionFinalization { .. } => (
                        written,
                        ClientConnectorState::ConnectionFinalization {
                            static_channel_ids,
                            connection_activation,
                        },
                    ),
                    _ => return Err(general_err!("invalid state (this is a bug)")),
                }
            }

            //== Connection Finalization ==//
            // Client and server exchange synchronize / control / font PDUs.
            ClientConnectorState::ConnectionFinalization {
                static_channel_ids,
                mut connection_activation,
            } => {
                let written = connection_activation.step(input, output)?;

                let next_state = if !connection_activation.state.is_terminal() {
                    ClientConnectorState::ConnectionFinalization {
                        static_channel_ids,
                        connection_activation,
                    }
                } else {
                    match connection_activation.state {
                        ConnectionActivationState::Finalized {
                            io_channel_id,
                            user_channel_id,
                            desktop_size,
                            ..
                        } => {
                            let static_channels = self
                                .static_channels
                                .iter()
                                .cloned()
                                .zip(static_channel_ids.iter().copied())
                                .collect();

                            ClientConnectorState::Connected {
                                result: ConnectionResult {
                                    io_channel_id,
                                    user_channel_id,
                                    static_channels,
                                    desktop_size,
                                    connection_activation,
                                },
                            }
                        }
                        _ => return Err(general_err!("invalid state (this is a bug)")),
                    }
                };

                (written, next_state)
            }

            //== Connected ==//
            // The client connector job is done.
            ClientConnectorState::Connected { .. } => return Err(general_err!("already connected")),
        };

        self.state = next_state;

        Ok(written)
    }
}

fn create_gcc_blocks(
    config: &Config,
    selected_protocol: nego::SecurityProtocol,
    static_channels: &[ChannelName],
) -> gcc::ClientGccBlocks {
    use cobalt_pdu::gcc::{
        ClientCoreData, ClientCoreOptionalData, ClientEarlyCapabilityFlags, ClientGccBlocks, ClientNetworkData,
        ClientSecurityData, ColorDepth, ConnectionType, HighColorDepth, RdpVersion, SecureAccessSequence,
        SupportedColorDepths,
    };

    let max_color_depth = config.bitmap.as_ref().map(|bitmap| bitmap.color_depth).unwrap_or(32);

    // The authoritative request is the combination of highColorDepth,
    // supportedColorDepths and the WANT_32_BPP_SESSION early capability flag;
    // a 32-bit session is requested as 24-bit plus the 32-bit flags.
    let (high_color_depth, supported_color_depths) = match max_color_depth {
        15 => (HighColorDepth::Rgb555Bpp16, SupportedColorDepths::BPP15),
        16 => (HighColorDepth::Rgb565Bpp16, SupportedColorDepths::BPP16),
        24 => (HighColorDepth::Bpp24, SupportedColorDepths::BPP24),
        _ => (
            HighColorDepth::Bpp24,
            SupportedColorDepths::BPP32 | SupportedColorDepths::BPP16,
        ),
    };

    let channels = static_channels
        .iter()
        .map(|name| ChannelDef {
            name: name.clone(),
            options: ChannelOptions::INITIALIZED | ChannelOptions::COMPRESS_RDP,
        })
        .collect::<Vec<_>>();

    let client_name: String = config.client_name.chars().take(15).collect();

    ClientGccBlocks {
        core: ClientCoreData {
            version: RdpVersion::V5_PLUS,
            desktop_width: config.desktop_size.width,
            desktop_height: config.desktop_size.height,
            // Legacy fields, ignored because the optional core data below is
            // always present.
            color_depth: ColorDepth::Bpp8,
            sec_access_sequence: SecureAccessSequence::Del,
            keyboard_layout: config.keyboard_layout,
            client_build: config.client_build,
            client_name,
            keyboard_type: config.keyboard_type,
            keyboard_subtype: config.keyboard_subtype,
            keyboard_functional_keys_count: config.keyboard_functional_keys_count,
            ime_file_name: config.ime_file_name.clone(),
            optional_data: ClientCoreOptionalData {
                post_beta2_color_depth: Some(ColorDepth::Rgb565Bpp16),
                client_product_id: Some(1),
                serial_number: Some(0),
                high_color_depth: Some(high_color_depth),
                supported_color_depths: Some(supported_color_depths),
                early_capability_flags: {
                    let mut early_capability_flags = ClientEarlyCapabilityFlags::VALID_CONNECTION_TYPE
                        | ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU
                        | ClientEarlyCapabilityFlags::STRONG_ASYMMETRIC_KEYS;

                    if max_color_depth == 32 {
                        early_capability_flags |= ClientEarlyCapabilityFlags::WANT_32_BPP_SESSION;
                    }

                    Some(early_capability_flags)
                },
                dig_product_id: Some(config.dig_product_id.clone()),
                connection_type: Some(ConnectionType::Lan),
                server_selected_protocol: Some(selected_protocol),
            },
        },
        security: ClientSecurityData::no_security(),
        network: if channels.is_empty() {
            None
        } else {
            Some(ClientNetworkData { channels })
        },
        cluster: None,
        message_channel: None,
        multi_transport_channel: None,
    }
}

fn create_client_info_pdu(config: &Config, client_addr: &str) -> rdp::ClientInfoPdu {
    use cobalt_pdu::rdp::client_info::{
        AddressFamily, ClientInfo, ClientInfoFlags, CompressionType, Credentials, ExtendedClientInfo,
        ExtendedClientOptionalInfo,
    };
    use cobalt_pdu::rdp::headers::{BasicSecurityHeader, BasicSecurityHeaderFlags};
    use cobalt_pdu::rdp::ClientInfoPdu;

    let security_header = BasicSecurityHeader {
        flags: BasicSecurityHeaderFlags::INFO_PKT,
    };

    // Default flags for all sessions
    let mut flags = ClientInfoFlags::MOUSE
        | ClientInfoFlags::MOUSE_HAS_WHEEL
        | ClientInfoFlags::UNICODE
        | ClientInfoFlags::DISABLE_CTRL_ALT_DEL
        | ClientInfoFlags::LOGON_NOTIFY
        | ClientInfoFlags::LOGON_ERRORS
        | ClientInfoFlags::ENABLE_WINDOWS_KEY
        | ClientInfoFlags::MAXIMIZE_SHELL;

    if config.autologon {
        flags |= ClientInfoFlags::AUTOLOGON;
    }

    if config.no_audio_playback {
        flags |= ClientInfoFlags::NO_AUDIO_PLAYBACK;
    }

    let client_info = ClientInfo {
        credentials: Credentials {
            username: config.credentials.username.clone(),
            password: config.credentials.password.clone(),
            domain: config.credentials.domain.clone(),
        },
        code_page: 0, // ignored when the keyboardLayout of the Client Core Data is set
        flags,
        compression_type: CompressionType::K8, // ignored when ClientInfoFlags::COMPRESSION is not set
        alternate_shell: String::new(),
        work_dir: String::new(),
        extra_info: ExtendedClientInfo {
            address_family: if client_addr.contains(':') {
                AddressFamily::INet6
            } else {
                AddressFamily::INet
            },
            address: client_addr.to_owned(),
            dir: config.client_dir.clone(),
            optional_data: ExtendedClientOptionalInfo::default(),
        },
    };

    ClientInfoPdu {
        security_header,
        client_info,
    }
}
