//! Who is inside the room right now.
//!
//! The reader counter of the lock can't be used for that: the first reader bumps it before the
//! room is actually taken and keeps the counter locked while it waits. So each role reports
//! itself here once it's really inside and right before it leaves, and every admission checks
//! the room's invariant: readers XOR one writer.

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Occupancy {
    pub readers: usize,
    pub writers: usize,
}

impl Occupancy {
    pub fn is_empty(&self) -> bool {
        self.readers == 0 && self.writers == 0
    }

    pub(crate) fn admit_reader(&mut self) -> Result<(), ProtocolError> {
        if self.writers > 0 {
            return Err(ProtocolError::ReaderWithWriter);
        }
        self.readers += 1;
        Ok(())
    }

    pub(crate) fn admit_writer(&mut self) -> Result<(), ProtocolError> {
        if self.writers > 0 {
            return Err(ProtocolError::ConcurrentWriters);
        }
        if self.readers > 0 {
            return Err(ProtocolError::WriterWithReaders {
                readers: self.readers,
            });
        }
        self.writers = 1;
        Ok(())
    }

    pub(crate) fn dismiss_reader(&mut self) -> Result<(), ProtocolError> {
        self.readers = self
            .readers
            .checked_sub(1)
            .ok_or(ProtocolError::ExitUnderflow { role: "reader" })?;
        Ok(())
    }

    pub(crate) fn dismiss_writer(&mut self) -> Result<(), ProtocolError> {
        self.writers = self
            .writers
            .checked_sub(1)
            .ok_or(ProtocolError::ExitUnderflow { role: "writer" })?;
        Ok(())
    }
}
