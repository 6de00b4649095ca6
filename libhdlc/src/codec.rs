use super::{Config, Decoder, Encoder, Status};

use bytes::{Buf, Bytes, BytesMut};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;


/// Default maximum payload size of a frame.
pub const DEFAULT_MAX_FRAME: usize = 512;

/// Upper bound for the maximum payload size of a codec.
pub const MAX_FRAME_LIMIT: usize = u16::MAX as usize;


/// Stream codec producing and consuming frame payloads on top of a raw
/// bitstream.
#[derive(Debug)]
pub struct Codec {
    dec: Decoder,
    enc: Encoder,
    buf: Box<[u8]>,
}

impl Codec {
    pub fn new(config: Config) -> Self {
        Self::with_capacity(config, DEFAULT_MAX_FRAME)
    }

    /// Create a codec accepting frame payloads of up to `max_frame` octets,
    /// limited to [`MAX_FRAME_LIMIT`].
    pub fn with_capacity(config: Config, max_frame: usize) -> Self {
        let max_frame = max_frame.min(MAX_FRAME_LIMIT);

        Self {
            dec: Decoder::new(config),
            enc: Encoder::new(config),
            buf: vec![0; max_frame + 2].into_boxed_slice(),
        }
    }

    pub fn max_frame(&self) -> usize {
        self.buf.len() - 2
    }

    pub fn reset(&mut self) {
        self.dec.reset();
        self.enc.reset();
    }

    pub fn wrap<T>(self, io: T) -> Framed<T, Codec>
    where
        T: AsyncRead + AsyncWrite,
    {
        Framed::with_capacity(io, self, 4096 as _)
    }

    fn check(&self, len: usize) -> Result<(), std::io::Error> {
        if len == 0 || len > self.max_frame() {
            let msg = format!("invalid frame length: {len}");
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, msg));
        }

        Ok(())
    }
}

impl tokio_util::codec::Encoder<&[u8]> for Codec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.check(frame.len())?;
        self.enc.encode_frame(frame, dst);
        Ok(())
    }
}

impl tokio_util::codec::Encoder<Bytes> for Codec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.check(frame.len())?;
        self.enc.encode_frame(&frame, dst);
        Ok(())
    }
}

impl tokio_util::codec::Decoder for Codec {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let (n, status) = self.dec.decode(src, &mut self.buf);
            src.advance(n);

            match status {
                Status::Pending => return Ok(None),
                Status::Frame(len) => return Ok(Some(Bytes::copy_from_slice(&self.buf[..len]))),
                Status::Error(e) => {
                    tracing::warn!("error decoding data: {e}");
                },
            }
        }
    }
}
