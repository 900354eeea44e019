//! Offline re-framing of a captured upstream stream.
//!
//! Useful for checking what the browser would receive for a given capture
//! (`curl -N ... > capture.sse`) without a running server or an API key.

use std::io::{self, Write};

use crate::core::reframe::{ReframeStats, Reframer};

pub fn replay<W: Write>(input: &[u8], show_tokens: bool, out: &mut W) -> io::Result<ReframeStats> {
    let mut reframer = Reframer::new();
    let mut tokens = Vec::new();
    reframer.push_chunk(input, &mut tokens);
    reframer.finish(&mut tokens);

    for token in tokens {
        if show_tokens {
            writeln!(out, "{token:?}")?;
        } else {
            out.write_all(token.into_text().as_bytes())?;
        }
    }
    if !show_tokens {
        writeln!(out)?;
    }
    out.flush()?;

    Ok(reframer.stats())
}
