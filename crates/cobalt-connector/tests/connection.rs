//! Drives the client connection sequence against a scripted server: the
//! server-side PDUs are produced with this workspace's own encoders.

use std::borrow::Cow;

use cobalt_connector::connection_activation::ConnectionActivationState;
use cobalt_connector::{
    ClientConnector, ClientConnectorState, Config, ConnectionResult, Credentials, DesktopSize, Sequence as _,
};
use cobalt_core::{encode_vec, WriteBuf};
use cobalt_pdu::gcc::{
    ChannelName, ConferenceCreateResponse, RdpVersion, ServerCoreData, ServerCoreOptionalData, ServerGccBlocks,
    ServerNetworkData, ServerSecurityData,
};
use cobalt_pdu::mcs::{
    AttachUserConfirm, ChannelJoinConfirm, ConnectResponse, DomainParameters, SendDataIndication,
};
use cobalt_pdu::nego::{ConnectionConfirm, ResponseFlags, SecurityProtocol};
use cobalt_pdu::rdp::capability_sets::{
    Bitmap, BitmapDrawingFlags, CapabilitySet, DemandActive, General, Input, InputFlags, Pointer, ServerDemandActive,
    SERVER_CHANNEL_ID,
};
use cobalt_pdu::rdp::finalization_messages::{ControlAction, ControlPdu, FontPdu, SynchronizePdu};
use cobalt_pdu::rdp::headers::{ShareControlHeader, ShareControlPdu, ShareDataPdu};
use cobalt_pdu::rdp::server_license::InitialServerLicenseMessage;
use cobalt_pdu::x224::{X224, X224Data};

const IO_CHANNEL_ID: u16 = 1003;
const DRDYNVC_CHANNEL_ID: u16 = 1004;
const USER_CHANNEL_ID: u16 = 1002;
const SHARE_ID: u32 = 0x0001_000A;

fn test_config() -> Config {
    Config {
        desktop_size: DesktopSize { width: 1024, height: 768 },
        enable_tls: true,
        enable_credssp: false,
        credentials: Credentials {
            username: "User".to_owned(),
            password: "Password".to_owned(),
            domain: None,
        },
        client_build: 0,
        client_name: "HOST".to_owned(),
        keyboard_type: cobalt_pdu::gcc::KeyboardType::IbmEnhanced,
        keyboard_subtype: 0,
        keyboard_functional_keys_count: 12,
        keyboard_layout: 0x0000_0409,
        ime_file_name: String::new(),
        bitmap: None,
        dig_product_id: String::new(),
        client_dir: "C:\\Windows\\System32\\mstscax.dll".to_owned(),
        platform: cobalt_pdu::rdp::capability_sets::MajorPlatformType::UNSPECIFIED,
        request_data: None,
        autologon: false,
        no_audio_playback: false,
        performance_flags: cobalt_pdu::rdp::client_info::PerformanceFlags::default(),
    }
}

fn send_data_indication(user_data: Vec<u8>) -> Vec<u8> {
    encode_vec(&X224(SendDataIndication {
        initiator_id: USER_CHANNEL_ID,
        channel_id: IO_CHANNEL_ID,
        user_data: Cow::Owned(user_data),
    }))
    .unwrap()
}

fn share_control_frame(pdu: ShareControlPdu) -> Vec<u8> {
    let header = ShareControlHeader {
        share_control_pdu: pdu,
        pdu_source: SERVER_CHANNEL_ID,
        share_id: SHARE_ID,
    };

    send_data_indication(encode_vec(&header).unwrap())
}

fn share_data_frame(pdu: ShareDataPdu) -> Vec<u8> {
    use cobalt_pdu::rdp::client_info::CompressionType;
    use cobalt_pdu::rdp::headers::{CompressionFlags, ShareDataHeader, StreamPriority};

    share_control_frame(ShareControlPdu::Data(ShareDataHeader {
        share_data_pdu: pdu,
        stream_priority: StreamPriority::Low,
        compression_flags: CompressionFlags::empty(),
        compression_type: CompressionType::K8,
    }))
}

fn connect_response_frame() -> Vec<u8> {
    let connect_response = ConnectResponse {
        conference_create_response: ConferenceCreateResponse {
            user_id: USER_CHANNEL_ID,
            gcc_blocks: ServerGccBlocks {
                core: ServerCoreData {
                    version: RdpVersion::V5_PLUS,
                    optional_data: ServerCoreOptionalData::default(),
                },
                network: ServerNetworkData {
                    io_channel: IO_CHANNEL_ID,
                    channel_ids: vec![DRDYNVC_CHANNEL_ID],
                },
                security: ServerSecurityData::no_security(),
                message_channel: None,
                multi_transport_channel: None,
            },
        },
        called_connect_id: 0,
        domain_parameters: DomainParameters::target(),
    };

    let payload = encode_vec(&connect_response).unwrap();

    encode_vec(&X224(X224Data {
        data: Cow::Owned(payload),
    }))
    .unwrap()
}

fn demand_active_frame(width: u16, height: u16) -> Vec<u8> {
    let demand_active = ServerDemandActive {
        pdu: DemandActive {
            source_descriptor: "RDP".to_owned(),
            capability_sets: vec![
                CapabilitySet::General(General::default()),
                CapabilitySet::Bitmap(Bitmap {
                    pref_bits_per_pix: 32,
                    desktop_width: width,
                    desktop_height: height,
                    desktop_resize_flag: true,
                    drawing_flags: BitmapDrawingFlags::ALLOW_SKIP_ALPHA,
                }),
                CapabilitySet::Order(cobalt_pdu::rdp::capability_sets::Order::new(
                    cobalt_pdu::rdp::capability_sets::OrderFlags::NEGOTIATE_ORDER_SUPPORT,
                    cobalt_pdu::rdp::capability_sets::OrderSupportExFlags::empty(),
                    0,
                    0,
                )),
                CapabilitySet::Input(Input {
                    input_flags: InputFlags::SCANCODES | InputFlags::FASTPATH_INPUT,
                    keyboard_layout: 0,
                    keyboard_type: None,
                    keyboard_subtype: 0,
                    keyboard_function_key: 12,
                    keyboard_ime_filename: String::new(),
                }),
                CapabilitySet::Pointer(Pointer {
                    color_pointer_cache_size: 25,
                    pointer_cache_size: 25,
                }),
            ],
        },
    };

    share_control_frame(ShareControlPdu::ServerDemandActive(demand_active))
}

fn step(connector: &mut ClientConnector, input: &[u8]) -> WriteBuf {
    let mut buf = WriteBuf::new();
    connector.step(input, &mut buf).unwrap();
    buf
}

fn step_no_input(connector: &mut ClientConnector) -> WriteBuf {
    let mut buf = WriteBuf::new();
    connector.step_no_input(&mut buf).unwrap();
    buf
}

fn run_handshake(connector: &mut ClientConnector) -> ConnectionResult {
    // Connection initiation: the client sends an X.224 connection request.
    let request = step_no_input(connector);
    assert!(!request.is_empty());

    // The server answers with a negotiation response selecting TLS.
    let confirm = encode_vec(&X224(ConnectionConfirm::Response {
        flags: ResponseFlags::empty(),
        protocol: SecurityProtocol::SSL,
    }))
    .unwrap();
    step(connector, &confirm);

    // Security upgrade happens on the transport, outside the state machine.
    assert!(connector.should_perform_security_upgrade());
    connector.mark_security_upgrade_as_done().unwrap();

    // Basic settings exchange.
    let connect_initial = step_no_input(connector);
    assert!(!connect_initial.is_empty());
    step(connector, &connect_response_frame());

    // Channel connection.
    let erect_domain = step_no_input(connector);
    assert!(!erect_domain.is_empty());
    let attach_user = step_no_input(connector);
    assert!(!attach_user.is_empty());

    let attach_user_confirm = encode_vec(&X224(AttachUserConfirm {
        result: 0,
        initiator_id: USER_CHANNEL_ID,
    }))
    .unwrap();
    step(connector, &attach_user_confirm);

    let join_requests = step_no_input(connector);
    assert!(!join_requests.is_empty());

    for channel_id in [USER_CHANNEL_ID, IO_CHANNEL_ID, DRDYNVC_CHANNEL_ID] {
        let confirm = encode_vec(&X224(ChannelJoinConfirm {
            result: 0,
            initiator_id: USER_CHANNEL_ID,
            requested_channel_id: channel_id,
            channel_id,
        }))
        .unwrap();
        step(connector, &confirm);
    }

    // Secure settings exchange: the client info PDU goes out.
    let client_info = step_no_input(connector);
    assert!(!client_info.is_empty());

    // Licensing: the server reports STATUS_VALID_CLIENT.
    let license = send_data_indication(
        encode_vec(&InitialServerLicenseMessage::new_status_valid_client_message()).unwrap(),
    );
    step(connector, &license);

    // Capabilities exchange.
    let confirm_active = step(connector, &demand_active_frame(1024, 768));
    assert!(!confirm_active.is_empty());

    // Finalization: synchronize, cooperate, request control, font list.
    for _ in 0..4 {
        let out = step_no_input(connector);
        assert!(!out.is_empty());
    }

    // Server finalization responses.
    step(
        connector,
        &share_data_frame(ShareDataPdu::Synchronize(SynchronizePdu { target_user_id: 0 })),
    );
    step(
        connector,
        &share_data_frame(ShareDataPdu::Control(ControlPdu {
            action: ControlAction::Cooperate,
            grant_id: 0,
            control_id: 0,
        })),
    );
    step(
        connector,
        &share_data_frame(ShareDataPdu::Control(ControlPdu {
            action: ControlAction::GrantedControl,
            grant_id: USER_CHANNEL_ID,
            control_id: u32::from(SERVER_CHANNEL_ID),
        })),
    );
    step(connector, &share_data_frame(ShareDataPdu::FontMap(FontPdu::default())));

    match std::mem::take(&mut connector.state) {
        ClientConnectorState::Connected { result } => result,
        other => panic!("connector did not reach the connected state: {other:?}"),
    }
}

#[test]
fn handshake_happy_path_reaches_steady_state() {
    let mut connector = ClientConnector::new(test_config(), "192.168.0.100".to_owned())
        .with_static_channel(ChannelName::from_static(b"drdynvc\0"));

    let result = run_handshake(&mut connector);

    assert_eq!(result.io_channel_id, IO_CHANNEL_ID);
    assert_eq!(result.user_channel_id, USER_CHANNEL_ID);
    assert_eq!(result.desktop_size.width, 1024);
    assert_eq!(result.desktop_size.height, 768);
    assert_eq!(
        result.channel_id_by_name(&ChannelName::from_static(b"drdynvc\0")),
        Some(DRDYNVC_CHANNEL_ID)
    );

    match &result.connection_activation.state {
        ConnectionActivationState::Finalized {
            share_id,
            bits_per_pixel,
            ..
        } => {
            assert_eq!(*share_id, SHARE_ID);
            assert_eq!(*bits_per_pixel, 32);
        }
        other => panic!("unexpected activation state: {other:?}"),
    }
}

#[test]
fn deactivate_all_reenters_capabilities_exchange_with_new_size() {
    let mut connector = ClientConnector::new(test_config(), "192.168.0.100".to_owned())
        .with_static_channel(ChannelName::from_static(b"drdynvc\0"));

    let result = run_handshake(&mut connector);

    // The session would hand this reset clone back after receiving a Server
    // Deactivate All PDU.
    let mut activation = result.connection_activation.reset_clone();
    assert!(matches!(
        activation.state,
        ConnectionActivationState::CapabilitiesExchange { .. }
    ));

    // The server demands a new capability exchange with a different size.
    let mut buf = WriteBuf::new();
    activation.step(&demand_active_frame(1920, 1080), &mut buf).unwrap();
    assert!(!buf.is_empty());

    for _ in 0..4 {
        let mut buf = WriteBuf::new();
        activation.step_no_input(&mut buf).unwrap();
        assert!(!buf.is_empty());
    }

    for frame in [
        share_data_frame(ShareDataPdu::Synchronize(SynchronizePdu { target_user_id: 0 })),
        share_data_frame(ShareDataPdu::Control(ControlPdu {
            action: ControlAction::Cooperate,
            grant_id: 0,
            control_id: 0,
        })),
        share_data_frame(ShareDataPdu::Control(ControlPdu {
            action: ControlAction::GrantedControl,
            grant_id: USER_CHANNEL_ID,
            control_id: u32::from(SERVER_CHANNEL_ID),
        })),
        share_data_frame(ShareDataPdu::FontMap(FontPdu::default())),
    ] {
        let mut buf = WriteBuf::new();
        activation.step(&frame, &mut buf).unwrap();
    }

    match &activation.state {
        ConnectionActivationState::Finalized { desktop_size, .. } => {
            assert_eq!(desktop_size.width, 1920);
            assert_eq!(desktop_size.height, 1080);
        }
        other => panic!("unexpected activation state: {other:?}"),
    }
}
