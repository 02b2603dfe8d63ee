use crate::storage::{Access, Namespace, Storage};
use crate::Loggable;
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

/// Bytes in front of the encoded entries holding their little-endian length
pub const HEADER_LEN: usize = 2;
pub const PAGE_ENTRIES: usize = 16;
const NAME_LEN: usize = 16;

/// A single erase block of non-volatile memory
pub trait PageIo {
    type Error: Loggable;

    fn read_page(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;
    /// Erase the page and program `data` at its start
    fn write_page(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}

#[derive(Debug)]
pub enum PageError<E> {
    Io(E),
    NotFound,
    ReadOnly,
    Full,
    NameTooLong,
    OutOfRange,
    EncodeError(serde_json_core::ser::Error),
}

impl<E> From<E> for PageError<E> {
    fn from(value: E) -> Self {
        PageError::Io(value)
    }
}

#[cfg(feature = "defmt")]
impl<E: defmt::Format> defmt::Format for PageError<E> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            PageError::Io(e) => defmt::write!(fmt, "Io({:?})", e),
            PageError::NotFound => defmt::write!(fmt, "NotFound"),
            PageError::ReadOnly => defmt::write!(fmt, "ReadOnly"),
            PageError::Full => defmt::write!(fmt, "Full"),
            PageError::NameTooLong => defmt::write!(fmt, "NameTooLong"),
            PageError::OutOfRange => defmt::write!(fmt, "OutOfRange"),
            PageError::EncodeError(e) => defmt::write!(fmt, "EncodeError({:?})", e),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Entry {
    ns: String<NAME_LEN>,
    key: String<NAME_LEN>,
    value: u32,
}

/// Key-value store kept in RAM and written back to one page on commit
///
/// Page layout: `[len_lo, len_hi, json...]`. An erased page (`0xFFFF`) or one that fails to
/// decode reads as empty.
pub struct PagedStore<IO, const N: usize> {
    io: IO,
    entries: Vec<Entry, PAGE_ENTRIES>,
    loaded: bool,
    buf: [u8; N],
}

impl<IO: PageIo, const N: usize> PagedStore<IO, N> {
    pub fn new(io: IO) -> Self {
        Self {
            io,
            entries: Vec::new(),
            loaded: false,
            buf: [0; N],
        }
    }

    fn load(&mut self) -> Result<(), PageError<IO::Error>> {
        if self.loaded {
            return Ok(());
        }

        self.io.read_page(&mut self.buf)?;
        let len = u16::from_le_bytes([self.buf[0], self.buf[1]]) as usize;
        self.entries = if len == 0 || len > N - HEADER_LEN {
            debug!("Storage page is blank");
            Vec::new()
        } else {
            match serde_json_core::from_slice::<Vec<Entry, PAGE_ENTRIES>>(
                &self.buf[HEADER_LEN..HEADER_LEN + len],
            ) {
                Ok((entries, _)) => entries,
                Err(e) => {
                    error!("Storage page is corrupt, starting over: {:?}", e);
                    Vec::new()
                }
            }
        };
        self.loaded = true;

        Ok(())
    }

    fn find(&self, ns: &str, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.ns.as_str() == ns && e.key.as_str() == key)
    }
}

impl<IO: PageIo, const N: usize> Storage for PagedStore<IO, N> {
    type Error = PageError<IO::Error>;
    type Namespace<'a>
        = PageNamespace<'a, IO, N>
    where
        Self: 'a;

    fn open(
        &mut self,
        namespace: &'static str,
        access: Access,
    ) -> Result<Self::Namespace<'_>, Self::Error> {
        self.load()?;
        if access == Access::ReadOnly && !self.entries.iter().any(|e| e.ns.as_str() == namespace)
        {
            return Err(PageError::NotFound);
        }

        Ok(PageNamespace {
            store: self,
            ns: namespace,
            access,
            staged: Vec::new(),
        })
    }
}

/// Handle on one namespace; writes stay staged here until [`Namespace::commit`] lands them
pub struct PageNamespace<'a, IO, const N: usize> {
    store: &'a mut PagedStore<IO, N>,
    ns: &'static str,
    access: Access,
    staged: Vec<(String<NAME_LEN>, u32), PAGE_ENTRIES>,
}

impl<IO: PageIo, const N: usize> PageNamespace<'_, IO, N> {
    fn get(&self, key: &str) -> Result<u32, PageError<IO::Error>> {
        if let Some((_, value)) = self.staged.iter().find(|(k, _)| k.as_str() == key) {
            return Ok(*value);
        }

        self.store
            .find(self.ns, key)
            .map(|i| self.store.entries[i].value)
            .ok_or(PageError::NotFound)
    }

    fn set(&mut self, key: &str, value: u32) -> Result<(), PageError<IO::Error>> {
        if self.access == Access::ReadOnly {
            return Err(PageError::ReadOnly);
        }

        if let Some((_, staged)) = self.staged.iter_mut().find(|(k, _)| k.as_str() == key) {
            *staged = value;
            return Ok(());
        }

        let key = String::try_from(key).map_err(|_| PageError::NameTooLong)?;
        self.staged
            .push((key, value))
            .map_err(|_| PageError::Full)
    }

    /// The stored entries with the staged writes applied
    fn merged(&self) -> Result<Vec<Entry, PAGE_ENTRIES>, PageError<IO::Error>> {
        let mut entries = self.store.entries.clone();
        for (key, value) in &self.staged {
            match entries
                .iter_mut()
                .find(|e| e.ns.as_str() == self.ns && e.key == *key)
            {
                Some(entry) => entry.value = *value,
                None => entries
                    .push(Entry {
                        ns: String::try_from(self.ns).map_err(|_| PageError::NameTooLong)?,
                        key: key.clone(),
                        value: *value,
                    })
                    .map_err(|_| PageError::Full)?,
            }
        }

        Ok(entries)
    }
}

impl<IO: PageIo, const N: usize> Namespace for PageNamespace<'_, IO, N> {
    type Error = PageError<IO::Error>;

    fn get_u32(&self, key: &str) -> Result<u32, Self::Error> {
        self.get(key)
    }

    fn get_u8(&self, key: &str) -> Result<u8, Self::Error> {
        u8::try_from(self.get(key)?).map_err(|_| PageError::OutOfRange)
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), Self::Error> {
        self.set(key, value)
    }

    fn set_u8(&mut self, key: &str, value: u8) -> Result<(), Self::Error> {
        self.set(key, value as u32)
    }

    fn commit(&mut self) -> Result<(), Self::Error> {
        if self.access == Access::ReadOnly {
            return Err(PageError::ReadOnly);
        }

        let entries = self.merged()?;
        let store = &mut *self.store;
        let len = serde_json_core::to_slice(&entries, &mut store.buf[HEADER_LEN..])
            .map_err(PageError::EncodeError)?;
        store.buf[..HEADER_LEN].copy_from_slice(&(len as u16).to_le_bytes());
        store.io.write_page(&store.buf[..HEADER_LEN + len])?;
        debug!("Committed {} entries ({} bytes)", entries.len(), len);

        store.entries = entries;
        self.staged.clear();

        Ok(())
    }
}
