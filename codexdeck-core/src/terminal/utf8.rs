//! Chunk-boundary-safe UTF-8 decoding
//!
//! Pty reads slice the byte stream arbitrarily, so a multi-byte scalar can
//! straddle two reads. The decoder withholds an incomplete trailing sequence
//! and prefixes it onto the next chunk, which keeps wide characters intact
//! without buffering whole lines. Genuinely invalid bytes are replaced, not
//! withheld, so garbage cannot stall the stream.

/// Streaming decoder that carries an incomplete trailing sequence forward
#[derive(Debug, Default)]
pub struct Utf8CarryDecoder {
    carry: Vec<u8>,
}

impl Utf8CarryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, holding back at most 3 trailing bytes
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(bytes);

        let split = complete_prefix_len(&buf);
        self.carry = buf.split_off(split);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Emit whatever is still held, lossily. Call at end of stream.
    pub fn flush(&mut self) -> String {
        if self.carry.is_empty() {
            String::new()
        } else {
            let carry = std::mem::take(&mut self.carry);
            String::from_utf8_lossy(&carry).into_owned()
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.carry.len()
    }
}

/// Length of the prefix that ends on a scalar boundary.
///
/// Scans backward over at most 3 continuation bytes (`10xxxxxx`) looking for
/// the lead byte of the final sequence. If that sequence is shorter than its
/// lead byte announces, the split lands before it; in every other case the
/// whole buffer is complete (invalid sequences included, which the lossy
/// conversion then replaces).
fn complete_prefix_len(buf: &[u8]) -> usize {
    let mut index = buf.len();
    for _ in 0..4 {
        if index == 0 {
            break;
        }
        index -= 1;
        let byte = buf[index];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let need = sequence_len(byte);
        let have = buf.len() - index;
        return if have < need { index } else { buf.len() };
    }
    // Four or more trailing continuation bytes cannot belong to one scalar
    buf.len()
}

fn sequence_len(lead: u8) -> usize {
    if lead < 0x80 {
        1
    } else if lead & 0b1110_0000 == 0b1100_0000 {
        2
    } else if lead & 0b1111_0000 == 0b1110_0000 {
        3
    } else if lead & 0b1111_1000 == 0b1111_0000 {
        4
    } else {
        // Invalid lead byte; emit it and let lossy conversion replace it
        1
    }
}
