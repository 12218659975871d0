use std::io::{Read, Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{CompileError, FilledDocument};

/// Pack serialized documents into one zip archive, in the given order.
pub(crate) fn write_archive<W: Write + Seek>(
    writer: W,
    documents: &[(String, Vec<u8>)],
) -> Result<W, CompileError> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in documents {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(bytes)?;
    }

    Ok(zip.finish()?)
}

pub(crate) fn read_archive<R: Read + Seek>(reader: R) -> Result<Vec<FilledDocument>, CompileError> {
    let mut archive = ZipArchive::new(reader)?;
    let mut documents = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        let document = serde_json::from_slice(&bytes).map_err(CompileError::Decode)?;
        documents.push(document);
    }

    Ok(documents)
}

/// Archive member name for the `index`-th template of a bundle.
pub(crate) fn entry_name(index: usize, source: &str) -> String {
    let stem = std::path::Path::new(source)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(source);
    format!("{:02}-{}.json", index + 1, stem)
}
