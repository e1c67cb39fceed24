//! Recording file naming.
//!
//! Every recording gets a trial number one above the largest already on
//! the card, so `DATA1.DAT`, `DATA2.DAT`, ... and the CSV exports of a
//! trial share its number (`LSM_ac2.csv`, `IIS_ac2.csv`, ...).

use core::fmt::Write as _;

use crate::config::ChannelId;
use crate::error::{Error, Result};

/// Longest file name produced here.
pub const FILE_NAME_MAX: usize = 40;

pub type FileName = heapless::String<FILE_NAME_MAX>;

/// Scan a directory listing for `<base><n><ext>` and return the next `n`.
///
/// Matching is case-sensitive.  The middle part is read like a decimal
/// prefix: leading digits count, anything after them is ignored, and no
/// digits at all reads as zero.  An empty directory yields 1.
pub fn next_trial_number<'a, I>(names: I, base: &str, ext: &str) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter(|name| name.len() >= base.len() + ext.len())
        .filter_map(|name| name.strip_prefix(base)?.strip_suffix(ext))
        .map(leading_number)
        .max()
        .unwrap_or(0)
        .saturating_add(1)
}

fn leading_number(s: &str) -> u32 {
    s.bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u32, |n, d| n.saturating_mul(10).saturating_add(u32::from(d - b'0')))
}

/// `<base><trial><ext>`, e.g. `DATA3.DAT`.
pub fn raw_file_name(base: &str, ext: &str, trial: u32) -> Result<FileName> {
    let mut name = FileName::new();
    write!(name, "{base}{trial}{ext}").map_err(|_| Error::Config("raw file name too long"))?;
    Ok(name)
}

/// Per-channel CSV export name, e.g. `LSM_gy3.csv`.
pub fn csv_file_name(channel: ChannelId, trial: u32) -> Result<FileName> {
    let mut name = FileName::new();
    write!(name, "{}{trial}.csv", channel.csv_prefix())
        .map_err(|_| Error::Config("csv file name too long"))?;
    Ok(name)
}
