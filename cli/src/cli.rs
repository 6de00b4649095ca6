use clap::{Parser, Subcommand};


/// Exercise the ISDN HDLC codec and TEI management from the command line
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Encode frame payloads into an HDLC bitstream
    Encode {
        #[command(flatten)]
        line: LineArgs,

        /// Frame payloads to encode, one frame per argument (hex)
        #[arg(required=true, value_parser=parse_hex)]
        frames: Vec<Hex>,
    },

    /// Decode an HDLC bitstream into frames
    Decode {
        #[command(flatten)]
        line: LineArgs,

        /// Feed the decoder in fragments of this many octets
        #[arg(long, default_value_t=32, value_parser=clap::value_parser!(u16).range(1..))]
        chunk: u16,

        /// Maximum frame payload size
        #[arg(long, default_value_t=512, value_parser=clap::value_parser!(u16).range(1..))]
        max_frame: u16,

        /// Bitstream to decode (hex)
        #[arg(value_parser=parse_hex)]
        stream: Hex,
    },

    /// Simulate TEI assignment between terminals and the network
    ///
    /// Runs a user-side and a network-side TEI entity connected by an
    /// in-memory D-channel, with management frames going through the HDLC
    /// codec.
    Tei {
        /// Number of terminals requesting a TEI
        #[arg(short, long, default_value_t=1)]
        terminals: usize,

        /// Drop the first N frames sent by the network to exercise retries
        #[arg(long, default_value_t=0)]
        drop: usize,
    },
}

/// Line options of the HDLC channel
#[derive(Debug, Clone, Copy, clap::Args)]
pub struct LineArgs {
    /// D-channel operation (all-ones idle between frames)
    #[arg(short='D', long)]
    pub d_channel: bool,

    /// 56 kbit/s rate adaptation (seven data bits per octet)
    #[arg(long)]
    pub adapt56: bool,

    /// Line octets carry their first bit in the LSB
    #[arg(long)]
    pub bit_reversed: bool,
}

/// Binary data given as hex string on the command line
#[derive(Debug, Clone)]
pub struct Hex(pub Vec<u8>);

fn parse_hex(s: &str) -> std::result::Result<Hex, String> {
    let s: String = s.chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    hex::decode(s)
        .map(Hex)
        .map_err(|e| format!("{e}"))
}


#[cfg(test)]
mod test {
    use super::*;

    fn decode_args(max_frame: &str) -> Result<Args, clap::Error> {
        Args::try_parse_from(["isdnctl", "decode", "--max-frame", max_frame, "7e001e0f7e"])
    }

    #[test]
    fn test_max_frame_range() {
        let args = decode_args("65535").unwrap();
        assert!(matches!(args.command, Command::Decode { max_frame: u16::MAX, .. }));

        assert!(decode_args("65536").is_err());
        assert!(decode_args("18446744073709551615").is_err());
        assert!(decode_args("0").is_err());
    }
}
