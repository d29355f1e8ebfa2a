//! permessage-deflate (RFC 7692). Gated behind the `compression` feature.

use flate2::{Compress, Compression, FlushCompress};

use crate::dispatch::WriteProtocol;
use crate::error::BoxError;
use crate::ext::{Extension, PayloadTxResult};

/// Trailing bytes the deflate library always appends on a sync flush;
/// RFC 7692 has the sender strip them and the receiver re-append them.
const DEFLATE_TAIL: &[u8] = &[0x00, 0x00, 0xff, 0xff];

/// RSV1 bit in the WS frame header, set on the first fragment of a
/// compressed message.
pub const RSV1: u8 = 0x40;

pub struct PerMessageDeflate {
    compress: Compress,
}

impl PerMessageDeflate {
    pub fn new() -> Self {
        Self {
            compress: Compress::new(Compression::default(), false),
        }
    }
}

impl Default for PerMessageDeflate {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for PerMessageDeflate {
    fn name(&self) -> &str {
        "permessage-deflate"
    }

    fn on_payload_tx(
        &mut self,
        input: &[u8],
        wp: WriteProtocol,
    ) -> Result<PayloadTxResult, BoxError> {
        if wp.is_control() {
            // Control frames bypass payload transforms entirely; the
            // dispatcher never calls us for them, but stay inert anyway.
            return Ok(PayloadTxResult {
                buf: input.to_vec(),
                buffer_identity_changed: false,
                more_to_drain: false,
                rsv: 0,
            });
        }

        let mut out = Vec::with_capacity(input.len());
        self.compress
            .compress_vec(input, &mut out, FlushCompress::Sync)
            .map_err(|e| Box::new(e) as BoxError)?;

        if out.ends_with(DEFLATE_TAIL) {
            out.truncate(out.len() - DEFLATE_TAIL.len());
        }

        Ok(PayloadTxResult {
            buf: out,
            buffer_identity_changed: true,
            more_to_drain: false,
            rsv: RSV1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Kind;

    #[test]
    fn compresses_and_sets_rsv1() {
        let mut ext = PerMessageDeflate::new();
        let wp = WriteProtocol::new(Kind::Text);
        let result = ext.on_payload_tx(b"hello hello hello hello", wp).unwrap();
        assert_eq!(result.rsv, RSV1);
        assert!(result.buffer_identity_changed);
        assert!(result.buf.len() < b"hello hello hello hello".len());
    }
}
