use anyhow::{Context, Result};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};
use tar::{Archive, Builder};
use xz2::read::XzDecoder;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];

/// Open a tarball that may be gzip or xz compressed, or not compressed at all
pub fn open_tar(path: &Path) -> Result<Archive<Box<dyn Read>>> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut magic = Vec::with_capacity(XZ_MAGIC.len());
    (&mut file)
        .take(XZ_MAGIC.len() as u64)
        .read_to_end(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    let reader: Box<dyn Read> = if magic.starts_with(GZIP_MAGIC) {
        Box::new(GzDecoder::new(file))
    } else if magic.starts_with(XZ_MAGIC) {
        Box::new(XzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Archive::new(reader))
}

/// Build a gzip compressed tarball in memory
pub fn gzip_tar<F>(fill: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut Builder<GzEncoder<Vec<u8>>>) -> Result<()>,
{
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    fill(&mut builder)?;
    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Append an in-memory regular file
pub fn append_bytes<W: std::io::Write>(
    builder: &mut Builder<W>,
    path: &str,
    data: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, data)?;
    Ok(())
}
