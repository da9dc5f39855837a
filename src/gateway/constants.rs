/// First RTP header byte: version 2, no padding, no extension, no CSRCs.
pub const RTP_VERSION_BYTE: u8 = 0x80;

/// RTP header length in bytes.
pub const RTP_HEADER_LEN: usize = 12;

/// Dynamic payload type used for L16 stereo when none is configured.
pub const RTP_DEFAULT_PAYLOAD_TYPE: u8 = 96;

/// Largest exponent applied to the reconnect backoff base (base * 2^3).
pub const BACKOFF_MAX_EXPONENT: u32 = 3;
