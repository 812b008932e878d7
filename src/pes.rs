//! Minimal PES inspection: enough of the PES header to reach the elementary
//! payload, and an Annex-B NAL scan to classify the first access unit in it
//! as intra or not, per spec.md §4.5's `first_intra_frame_index`.
//!
//! This is not a general PES/AVC/HEVC parser — only the slice-type
//! classification the file cleaner needs to find a safe cut point.

/// Outcome of scanning one PES packet's elementary payload for an access
/// unit boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// An IDR/CRA access unit was found: safe to start decoding here.
    Intra,
    /// A non-intra access unit was found before any intra one.
    NonIntra,
    /// No recognizable access unit start in this payload.
    Unknown,
}

const H264_NAL_NON_IDR_SLICE: u8 = 1;
const H264_NAL_PARTITION_A: u8 = 2;
const H264_NAL_PARTITION_B: u8 = 3;
const H264_NAL_PARTITION_C: u8 = 4;
const H264_NAL_IDR_SLICE: u8 = 5;
const HEVC_NAL_IDR_W_RADL: u8 = 19;
const HEVC_NAL_IDR_N_LP: u8 = 20;
const HEVC_NAL_CRA: u8 = 21;

/// Which NAL type space to interpret a byte under. H.264 and HEVC reuse the
/// same Annex-B start codes but assign different meanings to the NAL header,
/// so a codec-less scan can misread one stream as the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Avc,
    Hevc,
    /// `stream_type` didn't map to a codec this scanner knows how to read.
    Unknown,
}

impl VideoCodec {
    /// Maps a PMT `stream_type` byte to the NAL type space it uses.
    pub fn from_stream_type(stream_type: u8) -> VideoCodec {
        match stream_type {
            0x01 | 0x02 | 0x10 => VideoCodec::Unknown, // MPEG-1/2/4 video, no NAL scan needed here
            0x1B => VideoCodec::Avc,
            0x24 => VideoCodec::Hevc,
            _ => VideoCodec::Unknown,
        }
    }
}

/// True if `bytes` begins with a PES start code (`00 00 01`).
pub fn is_pes_start(bytes: &[u8]) -> bool {
    bytes.len() >= 3 && bytes[0] == 0 && bytes[1] == 0 && bytes[2] == 1
}

/// Parses just enough of a PES header to find where the elementary payload
/// begins. Returns the `stream_id` and the total header length consumed.
pub fn parse_pes_header(bytes: &[u8]) -> Option<(u8, usize)> {
    if bytes.len() < 9 || !is_pes_start(bytes) {
        return None;
    }
    let stream_id = bytes[3];
    if bytes[6] & 0xC0 != 0x80 {
        // marker bits '10' required by the optional PES header
        return None;
    }
    let header_data_len = bytes[8] as usize;
    let total = 9 + header_data_len;
    if bytes.len() < total {
        return None;
    }
    Some((stream_id, total))
}

/// Scans Annex-B elementary video bytes for the first VCL NAL unit and
/// classifies it as intra or not, interpreting NAL header bytes under
/// `codec`'s type space. Non-VCL NALs (AUD, SEI, parameter sets) are skipped
/// rather than classified, since skipping past them is what lets the scan
/// reach the slice NAL that actually determines the access unit's kind.
pub fn detect_frame_kind(elementary: &[u8], codec: VideoCodec) -> FrameKind {
    if codec == VideoCodec::Unknown {
        return FrameKind::Unknown;
    }
    let mut i = 0;
    while i + 3 <= elementary.len() {
        if elementary[i] == 0 && elementary[i + 1] == 0 && elementary[i + 2] == 1 {
            let nal_start = i + 3;
            if nal_start >= elementary.len() {
                break;
            }
            let nal_byte = elementary[nal_start];

            match codec {
                VideoCodec::Avc => {
                    let h264_type = nal_byte & 0x1F;
                    if h264_type == H264_NAL_IDR_SLICE {
                        return FrameKind::Intra;
                    }
                    if matches!(
                        h264_type,
                        H264_NAL_NON_IDR_SLICE
                            | H264_NAL_PARTITION_A
                            | H264_NAL_PARTITION_B
                            | H264_NAL_PARTITION_C
                    ) {
                        return FrameKind::NonIntra;
                    }
                    // AUD/SEI/SPS/PPS/etc: not a slice, keep scanning.
                }
                VideoCodec::Hevc => {
                    let hevc_type = (nal_byte >> 1) & 0x3F;
                    if hevc_type == HEVC_NAL_IDR_W_RADL
                        || hevc_type == HEVC_NAL_IDR_N_LP
                        || hevc_type == HEVC_NAL_CRA
                    {
                        return FrameKind::Intra;
                    }
                    if (0..=9).contains(&hevc_type) {
                        return FrameKind::NonIntra;
                    }
                    // AUD/VPS/SPS/PPS/SEI/etc: not a slice, keep scanning.
                }
                VideoCodec::Unknown => unreachable!("returned above"),
            }
            i = nal_start;
        } else {
            i += 1;
        }
    }
    FrameKind::Unknown
}

/// Scans one full PES packet (header + elementary payload) for its frame kind.
pub fn pes_frame_kind(bytes: &[u8], codec: VideoCodec) -> FrameKind {
    match parse_pes_header(bytes) {
        Some((_stream_id, header_len)) => detect_frame_kind(&bytes[header_len..], codec),
        None => FrameKind::Unknown,
    }
}
