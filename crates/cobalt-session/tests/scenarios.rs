//! End-to-end scenarios for the steady-state processors, with server-side
//! frames produced by this workspace's own encoders.

use std::borrow::Cow;

use cobalt_core::{encode_vec, WriteBuf};
use cobalt_pdu::bitmap::{BitmapData, BitmapUpdateData, Compression};
use cobalt_pdu::dvc;
use cobalt_pdu::fast_path::{
    EncryptionFlags, FastPathHeader, FastPathUpdatePdu, Fragmentation, UpdateCode,
};
use cobalt_pdu::geometry::{ExclusiveRectangle, InclusiveRectangle};
use cobalt_pdu::mcs::SendDataIndication;
use cobalt_pdu::rdp::capability_sets::CLIENT_NSCODEC_ID;
use cobalt_pdu::rdp::headers::{ShareControlHeader, ShareControlPdu, ServerDeactivateAll};
use cobalt_pdu::rdp::vc;
use cobalt_pdu::surface_commands::{ExtendedBitmapDataPdu, SurfaceBitsPdu, SurfaceCommand};
use cobalt_pdu::x224::X224;
use cobalt_session::fast_path::ProcessorBuilder;
use cobalt_session::image::DecodedImage;
use cobalt_session::x224::{Processor as X224Processor, ProcessorOutput};

const USER_CHANNEL_ID: u16 = 1002;
const IO_CHANNEL_ID: u16 = 1003;
const DRDYNVC_CHANNEL_ID: u16 = 1004;

fn fast_path_frame(update_code: UpdateCode, fragmentation: Fragmentation, payload: &[u8]) -> Vec<u8> {
    let update_pdu = FastPathUpdatePdu {
        fragmentation,
        update_code,
        compression_flags: None,
        compression_type: None,
        data: payload,
    };

    let update = encode_vec(&update_pdu).unwrap();

    let header = FastPathHeader::new(EncryptionFlags::empty(), update.len());
    let mut frame = encode_vec(&header).unwrap();
    frame.extend_from_slice(&update);

    frame
}

fn fast_path_processor() -> cobalt_session::fast_path::Processor {
    ProcessorBuilder {
        io_channel_id: IO_CHANNEL_ID,
        user_channel_id: USER_CHANNEL_ID,
        frame_ack_negotiated: true,
    }
    .build()
}

#[test]
fn bitmap_update_renders_16_bpp_pixels() {
    // One uncompressed 16-bpp 2x2 bitmap at (0,0). Source rows are
    // bottom-up: black / white first, then white / red.
    let bitmap_payload = encode_vec(&BitmapUpdateData {
        rectangles: vec![BitmapData {
            rectangle: InclusiveRectangle {
                left: 0,
                top: 0,
                right: 1,
                bottom: 1,
            },
            width: 2,
            height: 2,
            bits_per_pixel: 16,
            compression_flags: Compression::empty(),
            compressed_data_header: None,
            bitmap_data: &[0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0xF8],
        }],
    })
    .unwrap();

    let frame = fast_path_frame(UpdateCode::Bitmap, Fragmentation::Single, &bitmap_payload);

    let mut image = DecodedImage::new(2, 2);
    let mut processor = fast_path_processor();
    let mut output = WriteBuf::new();

    let result = processor.process(&mut image, &frame, &mut output).unwrap();

    assert_eq!(
        result.update_region,
        Some(InclusiveRectangle {
            left: 0,
            top: 0,
            right: 1,
            bottom: 1,
        })
    );

    let px: Vec<&[u8]> = image.data().chunks_exact(4).collect();
    assert_eq!(px[0], &[255, 255, 255, 255]);
    assert_eq!(px[1], &[255, 0, 0, 255]);
    assert_eq!(px[2], &[0, 0, 0, 255]);
    assert_eq!(px[3], &[255, 255, 255, 255]);
}

#[test]
fn fragmented_bitmap_update_is_reassembled() {
    let bitmap_payload = encode_vec(&BitmapUpdateData {
        rectangles: vec![BitmapData {
            rectangle: InclusiveRectangle {
                left: 0,
                top: 0,
                right: 0,
                bottom: 0,
            },
            width: 1,
            height: 1,
            bits_per_pixel: 16,
            compression_flags: Compression::empty(),
            compressed_data_header: None,
            bitmap_data: &[0xFF, 0xFF],
        }],
    })
    .unwrap();

    let (first, last) = bitmap_payload.split_at(bitmap_payload.len() / 2);

    let mut image = DecodedImage::new(1, 1);
    let mut processor = fast_path_processor();
    let mut output = WriteBuf::new();

    let frame = fast_path_frame(UpdateCode::Bitmap, Fragmentation::First, first);
    let result = processor.process(&mut image, &frame, &mut output).unwrap();
    assert_eq!(result.update_region, None);

    let frame = fast_path_frame(UpdateCode::Bitmap, Fragmentation::Last, last);
    let result = processor.process(&mut image, &frame, &mut output).unwrap();
    assert!(result.update_region.is_some());

    assert_eq!(image.data(), &[255, 255, 255, 255]);
}

#[test]
fn nscodec_surface_bits_render_one_gray_pixel() {
    // NSCodec stream: all plane counts 1, color loss level 1, no
    // subsampling, planes { 128, 128, 128 }.
    let mut nscodec_stream = Vec::new();
    for len in [1u32, 1, 1, 0] {
        nscodec_stream.extend_from_slice(&len.to_le_bytes());
    }
    nscodec_stream.push(1); // color loss level
    nscodec_stream.push(0); // no chroma subsampling
    nscodec_stream.extend_from_slice(&[0, 0]); // reserved
    nscodec_stream.extend_from_slice(&[128, 128, 128]);

    let command = SurfaceCommand::SetSurfaceBits(SurfaceBitsPdu {
        destination: ExclusiveRectangle {
            left: 0,
            top: 0,
            right: 1,
            bottom: 1,
        },
        extended_bitmap_data: ExtendedBitmapDataPdu {
            bpp: 32,
            codec_id: CLIENT_NSCODEC_ID,
            width: 1,
            height: 1,
            data: &nscodec_stream,
        },
    });

    let payload = encode_vec(&command).unwrap();
    let frame = fast_path_frame(UpdateCode::SurfaceCommands, Fragmentation::Single, &payload);

    let mut image = DecodedImage::new(1, 1);
    let mut processor = fast_path_processor();
    let mut output = WriteBuf::new();

    let result = processor.process(&mut image, &frame, &mut output).unwrap();

    assert!(result.update_region.is_some());
    assert_eq!(image.data(), &[128, 128, 128, 255]);
}

fn x224_processor() -> X224Processor {
    X224Processor::new(USER_CHANNEL_ID, IO_CHANNEL_ID, Some(DRDYNVC_CHANNEL_ID))
}

fn dvc_frame(server_pdu: dvc::ServerPdu) -> Vec<u8> {
    let dvc_payload = encode_vec(&server_pdu).unwrap();

    let channel_header = vc::ChannelPduHeader {
        length: dvc_payload.len() as u32,
        flags: vc::ChannelControlFlags::FLAG_FIRST | vc::ChannelControlFlags::FLAG_LAST,
    };

    let mut user_data = encode_vec(&channel_header).unwrap();
    user_data.extend_from_slice(&dvc_payload);

    encode_vec(&X224(SendDataIndication {
        initiator_id: USER_CHANNEL_ID,
        channel_id: DRDYNVC_CHANNEL_ID,
        user_data: Cow::Owned(user_data),
    }))
    .unwrap()
}

#[test]
fn dvc_fragmented_data_is_reassembled() {
    let mut processor = x224_processor();

    // Open channel 5.
    let create = dvc_frame(dvc::ServerPdu::CreateRequest(dvc::CreateRequestPdu {
        channel_id_type: dvc::FieldType::U8,
        channel_id: 0x05,
        channel_name: "testdvc".to_owned(),
    }));

    let outputs = processor.process(&create).unwrap();
    assert!(outputs
        .iter()
        .any(|o| matches!(o, ProcessorOutput::ChannelOpened { name, channel_id: 5 } if name == "testdvc")));
    assert!(outputs.iter().any(|o| matches!(o, ProcessorOutput::ResponseFrame(_))));

    // A data-first PDU declaring a total of 10 bytes with 4 payload bytes.
    let data_first = dvc_frame(dvc::ServerPdu::DataFirst(dvc::DataFirstPdu {
        channel_id_type: dvc::FieldType::U8,
        channel_id: 0x05,
        total_data_size: 10,
        data: vec![0, 1, 2, 3],
    }));

    let outputs = processor.process(&data_first).unwrap();
    assert!(outputs.is_empty());

    // A data PDU with the remaining 6 bytes completes the message.
    let data = dvc_frame(dvc::ServerPdu::Data(dvc::DataPdu {
        channel_id_type: dvc::FieldType::U8,
        channel_id: 0x05,
        data: vec![4, 5, 6, 7, 8, 9],
    }));

    let outputs = processor.process(&data).unwrap();
    assert_eq!(
        outputs,
        vec![ProcessorOutput::ChannelData {
            channel_id: 5,
            data: vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
        }]
    );
}

#[test]
fn dvc_data_on_closed_channel_is_dropped() {
    let mut processor = x224_processor();

    let data = dvc_frame(dvc::ServerPdu::Data(dvc::DataPdu {
        channel_id_type: dvc::FieldType::U8,
        channel_id: 0x09,
        data: vec![1, 2, 3],
    }));

    let outputs = processor.process(&data).unwrap();
    assert!(outputs.is_empty());
}

#[test]
fn deactivate_all_is_surfaced_as_a_distinguished_signal() {
    let mut processor = x224_processor();

    let header = ShareControlHeader {
        share_control_pdu: ShareControlPdu::ServerDeactivateAll(ServerDeactivateAll),
        pdu_source: 0x03EA,
        share_id: 0,
    };

    let frame = encode_vec(&X224(SendDataIndication {
        initiator_id: USER_CHANNEL_ID,
        channel_id: IO_CHANNEL_ID,
        user_data: Cow::Owned(encode_vec(&header).unwrap()),
    }))
    .unwrap();

    let outputs = processor.process(&frame).unwrap();
    assert_eq!(outputs, vec![ProcessorOutput::DeactivateAll]);
}
