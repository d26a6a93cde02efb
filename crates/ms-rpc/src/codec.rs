use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Garde-fou contre un préfixe de longueur corrompu. Une tâche
/// image-entière en 1920×1080 pèse quelques dizaines de Mo ; tout
/// message au-delà du Go est un flux invalide.
const MAX_MESSAGE_BYTES: usize = 1 << 30;

/// Écrit un message : longueur u32 big-endian puis corps bincode.
pub(crate) fn write_message<W: Write, T: Serialize>(writer: &mut W, value: &T) -> io::Result<()> {
    let body = bincode::serialize(value).map_err(io::Error::other)?;
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "message trop grand"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()
}

/// Lit un message : préfixe de longueur puis corps bincode.
pub(crate) fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<T> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_MESSAGE_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "préfixe de longueur invalide",
        ));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    bincode::deserialize(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
