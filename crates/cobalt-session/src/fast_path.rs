use cobalt_core::WriteBuf;
use cobalt_graphics::color_conversion::Palette;
use cobalt_graphics::{nscodec, rdp6, rle};
use cobalt_pdu::fast_path::{FastPathHeader, FastPathUpdate, FastPathUpdatePdu, Fragmentation, UpdateCode};
use cobalt_pdu::geometry::{ExclusiveRectangle, InclusiveRectangle, Rectangle as _};
use cobalt_pdu::rdp::capability_sets::CLIENT_NSCODEC_ID;
use cobalt_pdu::rdp::finalization_messages::FrameAcknowledgePdu;
use cobalt_pdu::rdp::headers::ShareDataPdu;
use cobalt_pdu::surface_commands::{FrameAction, FrameMarkerPdu, SurfaceCommand};
use cobalt_pdu::bitmap::Compression;

use crate::image::DecodedImage;
use crate::pointer::PointerUpdate;
use crate::{SessionErrorExt as _, SessionResult};

/// The server-to-client fast-path graphics pipeline: header parsing,
/// fragment reassembly, and update dispatch into the bitmap codecs.
pub struct Processor {
    complete_data: CompleteData,
    marker_processor: FrameMarkerProcessor,
    /// 8-bpp palette state; per-session, updated by palette update PDUs.
    palette: Palette,
    planar_buffer: Vec<u8>,
    nscodec_buffer: Vec<u8>,
    rle_buffer: Vec<u8>,
}

/// Everything a single fast-path PDU may produce.
#[derive(Debug, Default)]
pub struct ProcessorOutput {
    /// The region of the framebuffer that was updated, if any.
    pub update_region: Option<InclusiveRectangle>,
    /// Pointer updates to forward to the display sink.
    pub pointer_updates: Vec<PointerUpdate>,
}

impl Processor {
    pub fn process(
        &mut self,
        image: &mut DecodedImage,
        input: &[u8],
        output: &mut WriteBuf,
    ) -> SessionResult<ProcessorOutput> {
        let mut input = cobalt_core::ReadCursor::new(input);

        let header: FastPathHeader = cobalt_core::decode_cursor(&mut input).map_err(crate::SessionError::decode)?;
        trace!(fast_path_header = ?header, "Received Fast-Path packet");

        let update_pdu: FastPathUpdatePdu<'_> =
            cobalt_core::decode_cursor(&mut input).map_err(crate::SessionError::decode)?;
        trace!(fast_path_update_fragmentation = ?update_pdu.fragmentation);

        let processed_complete_data = self
            .complete_data
            .process_data(update_pdu.update_code, update_pdu.data, update_pdu.fragmentation);

        let update_code = update_pdu.update_code;

        let Some(data) = processed_complete_data else {
            return Ok(ProcessorOutput::default());
        };

        let update = FastPathUpdate::decode_with_code(data.as_slice(), update_code);

        let mut result = ProcessorOutput::default();

        match update {
            Ok(FastPathUpdate::SurfaceCommands(surface_commands)) => {
                trace!("Received Surface Commands: {} pieces", surface_commands.len());
                let update_region = self.process_surface_commands(image, output, surface_commands)?;
                result.update_region = update_region;
            }
            Ok(FastPathUpdate::Bitmap(bitmap_update)) => {
                trace!("Received bitmap update");

                let mut update_rectangle: Option<InclusiveRectangle> = None;

                for update in bitmap_update.rectangles {
                    trace!(?update);

                    // Bitmap data is either compressed or uncompressed,
                    // depending on the BITMAP_COMPRESSION flag.
                    if update.compression_flags.contains(Compression::BITMAP_COMPRESSION) {
                        if update.bits_per_pixel == 32 {
                            // 32 bpp compressed bitmaps use the RDP 6.0
                            // planar codec.
                            match rdp6::decode_bitmap_stream_to_rgba(
                                update.bitmap_data,
                                &mut self.planar_buffer,
                                usize::from(update.width),
                                usize::from(update.height),
                            ) {
                                Ok(()) => {
                                    image.apply_rgba_image(&self.planar_buffer, update.width, &update.rectangle);
                                }
                                Err(err) => {
                                    warn!("Invalid RDP6 bitmap stream: {err}");
                                    continue;
                                }
                            }
                        } else {
                            // Lower depths use the Interleaved RLE codec.
                            match rle::decompress(
                                update.bitmap_data,
                                &mut self.rle_buffer,
                                update.width,
                                update.height,
                                update.bits_per_pixel,
                            ) {
                                Ok(rle::RlePixelFormat::Rgb16) => {
                                    image.apply_rgb16_bitmap(&self.rle_buffer, update.width, &update.rectangle)
                                }
                                Ok(rle::RlePixelFormat::Rgb15) => {
                                    image.apply_rgb15_bitmap(&self.rle_buffer, update.width, &update.rectangle)
                                }
                                Ok(rle::RlePixelFormat::Rgb8) => image.apply_rgb8_bitmap(
                                    &self.rle_buffer,
                                    update.width,
                                    &update.rectangle,
                                    &self.palette,
                                ),
                                Ok(rle::RlePixelFormat::Rgb24) => {
                                    image.apply_bgr24_bitmap(&self.rle_buffer, update.width, &update.rectangle)
                                }
                                Ok(rle::RlePixelFormat::Bgra32) => {
                                    image.apply_bgra32_bitmap(&self.rle_buffer, update.width, &update.rectangle)
                                }
                                Err(e) => {
                                    warn!("Invalid RLE-compressed bitmap: {e}");
                                    continue;
                                }
                            }
                        }
                    } else {
                        // Uncompressed bitmap data is a bottom-up,
                        // left-to-right series of packed pixels.
                        match update.bits_per_pixel {
                            8 => image.apply_rgb8_bitmap(update.bitmap_data, update.width, &update.rectangle, &self.palette),
                            15 => image.apply_rgb15_bitmap(update.bitmap_data, update.width, &update.rectangle),
                            16 => image.apply_rgb16_bitmap(update.bitmap_data, update.width, &update.rectangle),
                            24 => image.apply_bgr24_bitmap(update.bitmap_data, update.width, &update.rectangle),
                            32 => image.apply_bgra32_bitmap(update.bitmap_data, update.width, &update.rectangle),
                            unsupported => {
                                warn!("Invalid raw bitmap with {unsupported} bits per pixel");
                                continue;
                            }
                        }
                    }

                    update_rectangle = Some(match update_rectangle {
                        Some(current) => current.union(&update.rectangle),
                        None => update.rectangle,
                    });
                }

                result.update_region = update_rectangle;
            }
            Ok(FastPathUpdate::Palette(palette_update)) => {
                trace!("Received palette update");

                for (index, entry) in palette_update.entries.iter().enumerate() {
                    self.palette.set(index as u8, [entry.red, entry.green, entry.blue]);
                }
            }
            Ok(FastPathUpdate::Pointer(pointer)) => {
                result.pointer_updates.push(PointerUpdate::from_pdu(pointer));
            }
            Err(e) => {
                // Unsupported updates (orders, synchronize) are skipped.
                debug!(?update_code, "Received unsupported Fast-Path update: {e}");
            }
        }

        Ok(result)
    }

    fn process_surface_commands(
        &mut self,
        image: &mut DecodedImage,
        output: &mut WriteBuf,
        surface_commands: Vec<SurfaceCommand<'_>>,
    ) -> SessionResult<Option<InclusiveRectangle>> {
        let mut update_rectangle: Option<InclusiveRectangle> = None;

        for command in surface_commands {
            match command {
                SurfaceCommand::SetSurfaceBits(bits) | SurfaceCommand::StreamSurfaceBits(bits) => {
                    trace!("Surface bits");

                    let codec_id = bits.extended_bitmap_data.codec_id;

                    if codec_id != CLIENT_NSCODEC_ID {
                        warn!(codec_id, "Unsupported codec ID in surface bits command");
                        continue;
                    }

                    let width = bits.extended_bitmap_data.width;
                    let height = bits.extended_bitmap_data.height;

                    match nscodec::decode_bitmap_stream_to_rgba(
                        bits.extended_bitmap_data.data,
                        &mut self.nscodec_buffer,
                        usize::from(width),
                        usize::from(height),
                    ) {
                        Ok(()) => {
                            let rectangle = exclusive_to_inclusive(&bits.destination);
                            image.apply_rgba_image(&self.nscodec_buffer, width, &rectangle);

                            update_rectangle = Some(match update_rectangle {
                                Some(current) => current.union(&rectangle),
                                None => rectangle,
                            });
                        }
                        Err(err) => {
                            warn!("Invalid NSCodec stream: {err}");
                        }
                    }
                }
                SurfaceCommand::FrameMarker(marker) => {
                    trace!(
                        "Frame marker: action {:?} with ID #{}",
                        marker.frame_action,
                        marker.frame_id.unwrap_or(0)
                    );
                    self.marker_processor.process(&marker, output)?;
                }
            }
        }

        Ok(update_rectangle)
    }
}

fn exclusive_to_inclusive(rect: &ExclusiveRectangle) -> InclusiveRectangle {
    InclusiveRectangle {
        left: rect.left,
        top: rect.top,
        right: rect.right.saturating_sub(1),
        bottom: rect.bottom.saturating_sub(1),
    }
}

pub struct ProcessorBuilder {
    pub io_channel_id: u16,
    pub user_channel_id: u16,
    /// Whether the Frame Acknowledge capability was negotiated; frame-end
    /// markers are only acknowledged when it was.
    pub frame_ack_negotiated: bool,
}

impl ProcessorBuilder {
    pub fn build(self) -> Processor {
        Processor {
            complete_data: CompleteData::new(),
            marker_processor: FrameMarkerProcessor {
                user_channel_id: self.user_channel_id,
                io_channel_id: self.io_channel_id,
                frame_ack_negotiated: self.frame_ack_negotiated,
            },
            palette: Palette::new(),
            planar_buffer: Vec::new(),
            nscodec_buffer: Vec::new(),
            rle_buffer: Vec::new(),
        }
    }
}

/// Fast-path update fragment reassembly.
///
/// Reassembly buffers live for the duration of one message; an error or an
/// unexpected fragment discards the buffer.
#[derive(Debug, PartialEq)]
struct CompleteData {
    fragmented_data: Option<(UpdateCode, Vec<u8>)>,
}

impl CompleteData {
    fn new() -> Self {
        Self { fragmented_data: None }
    }

    fn process_data(&mut self, code: UpdateCode, data: &[u8], fragmentation: Fragmentation) -> Option<Vec<u8>> {
        match fragmentation {
            Fragmentation::Single => {
                self.check_data_is_empty();

                Some(data.to_vec())
            }
            Fragmentation::First => {
                self.check_data_is_empty();

                self.fragmented_data = Some((code, data.to_vec()));

                None
            }
            Fragmentation::Next => {
                self.append_data(code, data);

                None
            }
            Fragmentation::Last => {
                self.append_data(code, data);

                self.fragmented_data.take().map(|(_, data)| data)
            }
        }
    }

    fn check_data_is_empty(&mut self) {
        if self.fragmented_data.is_some() {
            warn!("Skipping pending Fast-Path Update fragments");
            self.fragmented_data = None;
        }
    }

    fn append_data(&mut self, code: UpdateCode, data: &[u8]) {
        match self.fragmented_data.as_mut() {
            Some((pending_code, fragmented_data)) if *pending_code == code => {
                fragmented_data.extend_from_slice(data);
            }
            Some(_) => {
                warn!("Fast-Path Update fragment with a mismatched update code, discarding reassembly");
                self.fragmented_data = None;
            }
            None => {
                warn!("Got an unexpected Next/Last fragment without a prior First fragment");
            }
        }
    }
}

struct FrameMarkerProcessor {
    user_channel_id: u16,
    io_channel_id: u16,
    frame_ack_negotiated: bool,
}

impl FrameMarkerProcessor {
    fn process(&mut self, marker: &FrameMarkerPdu, output: &mut WriteBuf) -> SessionResult<()> {
        match marker.frame_action {
            FrameAction::Begin => Ok(()),
            FrameAction::End => {
                if !self.frame_ack_negotiated {
                    return Ok(());
                }

                cobalt_connector::io_channel::encode_share_data(
                    self.user_channel_id,
                    self.io_channel_id,
                    0,
                    ShareDataPdu::FrameAcknowledge(FrameAcknowledgePdu {
                        frame_id: marker.frame_id.unwrap_or(0),
                    }),
                    output,
                )
                .map_err(crate::SessionError::connector)?;

                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_are_reassembled_per_update_code() {
        let mut complete_data = CompleteData::new();

        assert_eq!(
            complete_data.process_data(UpdateCode::Bitmap, &[1, 2], Fragmentation::First),
            None
        );
        assert_eq!(
            complete_data.process_data(UpdateCode::Bitmap, &[3], Fragmentation::Next),
            None
        );
        assert_eq!(
            complete_data.process_data(UpdateCode::Bitmap, &[4], Fragmentation::Last),
            Some(vec![1, 2, 3, 4])
        );
    }

    #[test]
    fn single_fragment_passes_through() {
        let mut complete_data = CompleteData::new();

        assert_eq!(
            complete_data.process_data(UpdateCode::Bitmap, &[9, 9], Fragmentation::Single),
            Some(vec![9, 9])
        );
    }

    #[test]
    fn mismatched_fragment_code_discards_reassembly() {
        let mut complete_data = CompleteData::new();

        complete_data.process_data(UpdateCode::Bitmap, &[1], Fragmentation::First);
        complete_data.process_data(UpdateCode::SurfaceCommands, &[2], Fragmentation::Next);

        assert_eq!(
            complete_data.process_data(UpdateCode::Bitmap, &[3], Fragmentation::Last),
            None
        );
    }
}
