//! Synchronous block codecs run by the software accelerators

use super::CompletionStatus;

/// A block transform executed on one lane
pub trait BlockCodec: Send + Sync + 'static {
    /// Codec name
    fn name(&self) -> &'static str;

    /// Encode `input` into `output`, returning the encoded length
    ///
    /// # Errors
    /// `Incompressible` if the encoded form does not fit `output`
    fn encode(&self, input: &[u8], output: &mut [u8]) -> Result<usize, CompletionStatus>;

    /// Decode `input` into `output`, returning the decoded length
    ///
    /// # Errors
    /// `Malformed` for undecodable input, `OutputOverflow` if the decoded
    /// form does not fit `output`
    fn decode(&self, input: &[u8], output: &mut [u8]) -> Result<usize, CompletionStatus>;
}

/// Identity transform
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl BlockCodec for PassthroughCodec {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn encode(&self, input: &[u8], output: &mut [u8]) -> Result<usize, CompletionStatus> {
        let dst = output
            .get_mut(..input.len())
            .ok_or(CompletionStatus::Incompressible)?;
        dst.copy_from_slice(input);
        Ok(input.len())
    }

    fn decode(&self, input: &[u8], output: &mut [u8]) -> Result<usize, CompletionStatus> {
        let dst = output
            .get_mut(..input.len())
            .ok_or(CompletionStatus::OutputOverflow)?;
        dst.copy_from_slice(input);
        Ok(input.len())
    }
}

/// Byte-run encoding: a sequence of `(run length, byte)` pairs
///
/// Runs are 1..=255 bytes long. Data without repeats doubles in size and is
/// reported as incompressible once it stops fitting the output buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLengthCodec;

impl BlockCodec for RunLengthCodec {
    fn name(&self) -> &'static str {
        "run-length"
    }

    fn encode(&self, input: &[u8], output: &mut [u8]) -> Result<usize, CompletionStatus> {
        let mut written = 0;
        let mut pos = 0;
        while pos < input.len() {
            let byte = input[pos];
            let run = input[pos..]
                .iter()
                .take(u8::MAX as usize)
                .take_while(|&&b| b == byte)
                .count();
            if written + 2 > output.len() {
                return Err(CompletionStatus::Incompressible);
            }
            output[written] = run as u8;
            output[written + 1] = byte;
            written += 2;
            pos += run;
        }
        Ok(written)
    }

    fn decode(&self, input: &[u8], output: &mut [u8]) -> Result<usize, CompletionStatus> {
        if input.len() % 2 != 0 {
            return Err(CompletionStatus::Malformed);
        }
        let mut written = 0;
        for pair in input.chunks_exact(2) {
            let run = pair[0] as usize;
            if run == 0 {
                return Err(CompletionStatus::Malformed);
            }
            let dst = output
                .get_mut(written..written + run)
                .ok_or(CompletionStatus::OutputOverflow)?;
            dst.fill(pair[1]);
            written += run;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_length_compresses_runs() {
        let input = [7u8; 1000];
        let mut encoded = [0u8; 1000];
        let n = RunLengthCodec.encode(&input, &mut encoded).unwrap();
        // 3 full runs of 255 and one of 235
        assert_eq!(n, 8);

        let mut decoded = [0u8; 1000];
        let m = RunLengthCodec.decode(&encoded[..n], &mut decoded).unwrap();
        assert_eq!(m, 1000);
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_run_length_incompressible() {
        let input: Vec<u8> = (0..=255u8).collect();
        let mut encoded = vec![0u8; input.len()];
        assert_eq!(
            RunLengthCodec.encode(&input, &mut encoded),
            Err(CompletionStatus::Incompressible)
        );
    }

    #[test]
    fn test_run_length_rejects_malformed() {
        let mut out = [0u8; 16];
        assert_eq!(RunLengthCodec.decode(&[3], &mut out), Err(CompletionStatus::Malformed));
        assert_eq!(RunLengthCodec.decode(&[0, 9], &mut out), Err(CompletionStatus::Malformed));
        assert_eq!(
            RunLengthCodec.decode(&[200, 9], &mut out),
            Err(CompletionStatus::OutputOverflow)
        );
    }

    #[test]
    fn test_passthrough_bounds() {
        let mut out = [0u8; 4];
        assert_eq!(PassthroughCodec.encode(b"abcd", &mut out), Ok(4));
        assert_eq!(&out, b"abcd");
        assert_eq!(
            PassthroughCodec.encode(b"abcde", &mut out),
            Err(CompletionStatus::Incompressible)
        );
        assert_eq!(
            PassthroughCodec.decode(b"abcde", &mut out),
            Err(CompletionStatus::OutputOverflow)
        );
    }

    #[test]
    fn test_empty_block() {
        let mut out = [0u8; 0];
        assert_eq!(RunLengthCodec.encode(&[], &mut out), Ok(0));
        assert_eq!(RunLengthCodec.decode(&[], &mut out), Ok(0));
        assert_eq!(PassthroughCodec.encode(&[], &mut out), Ok(0));
    }
}
