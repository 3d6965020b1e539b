//! Binary PGM (P5) and PPM (P6) with 8-bit samples, enough to move pixels in and out of JPEG.

use anyhow::{Context, Result, bail, ensure};

pub struct Pnm {
    pub width: usize,
    pub height: usize,
    /// 1 for PGM, 3 for PPM.
    pub channels: usize,
    pub data: Vec<u8>,
}

struct Header<'a> {
    rest: &'a [u8],
}

impl<'a> Header<'a> {
    fn skip_space_and_comments(&mut self) {
        loop {
            match self.rest.first() {
                Some(b) if b.is_ascii_whitespace() => self.rest = &self.rest[1..],
                Some(b'#') => {
                    let end = self
                        .rest
                        .iter()
                        .position(|&b| b == b'\n')
                        .unwrap_or(self.rest.len());
                    self.rest = &self.rest[end..];
                }
                _ => return,
            }
        }
    }

    fn number(&mut self, what: &str) -> Result<usize> {
        self.skip_space_and_comments();
        let len = self.rest.iter().take_while(|b| b.is_ascii_digit()).count();
        ensure!(len > 0, "PNM header: missing {what}");
        let text = std::str::from_utf8(&self.rest[..len])?;
        self.rest = &self.rest[len..];
        text.parse().with_context(|| format!("PNM header: bad {what}"))
    }
}

pub fn decode(bytes: &[u8]) -> Result<Pnm> {
    let channels = match bytes.get(..2) {
        Some(b"P5") => 1,
        Some(b"P6") => 3,
        _ => bail!("not a binary PGM/PPM file"),
    };
    let mut header = Header { rest: &bytes[2..] };
    let width = header.number("width")?;
    let height = header.number("height")?;
    let maxval = header.number("maxval")?;
    ensure!(maxval == 255, "only 8-bit PNM is supported (maxval {maxval})");
    // Exactly one whitespace byte separates the header from the samples.
    let rest = header
        .rest
        .get(1..)
        .context("PNM header: truncated before pixel data")?;

    let len = width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(channels))
        .context("PNM dimensions overflow")?;
    ensure!(
        rest.len() >= len,
        "PNM pixel data is truncated: expected {len} bytes, found {}",
        rest.len()
    );
    Ok(Pnm {
        width,
        height,
        channels,
        data: rest[..len].to_vec(),
    })
}

pub fn encode(width: usize, height: usize, channels: usize, data: &[u8]) -> Result<Vec<u8>> {
    let magic = match channels {
        1 => "P5",
        3 => "P6",
        n => bail!("cannot write {n}-channel image as PNM"),
    };
    ensure!(data.len() == width * height * channels, "pixel data does not match dimensions");
    let mut out = format!("{magic}\n{width} {height}\n255\n").into_bytes();
    out.extend_from_slice(data);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_header_with_comments() {
        let mut file = b"P6\n# made by hand\n2 1\n255\n".to_vec();
        file.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        let pnm = decode(&file).unwrap();
        assert_eq!((pnm.width, pnm.height, pnm.channels), (2, 1, 3));
        assert_eq!(pnm.data, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn written_file_reads_back() {
        let data: Vec<u8> = (0..12).collect();
        let file = encode(4, 3, 1, &data).unwrap();
        assert!(file.starts_with(b"P5\n4 3\n255\n"));
        let pnm = decode(&file).unwrap();
        assert_eq!(pnm.data, data);
    }

    #[test]
    fn rejects_unsupported_inputs() {
        assert!(decode(b"P3\n1 1\n255\n0 0 0").is_err());
        assert!(decode(b"P5\n1 1\n65535\n\0\0").is_err());
        assert!(decode(b"P6\n2 2\n255\n\0\0\0").is_err());
        assert!(encode(1, 1, 4, &[0; 4]).is_err());
    }
}
