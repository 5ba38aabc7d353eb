//! Byte-source bridging for the OpenJPEG streaming API.
//!
//! The codec pulls data through C callbacks that receive an opaque user-data
//! pointer. Instead of smuggling a Rust reference across the foreign ABI, the
//! bridge hands the codec an integer id and keeps the actual readers in a
//! process-wide registry behind a mutex. Ids come from a monotonic counter;
//! an entry lives exactly as long as its `Stream` and is removed on drop,
//! success or failure alike.

use std::collections::HashMap;
use std::ffi::c_void;
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex};

use openjpeg_sys as opj;
use tracing::error;

use crate::error::ImageError;

/// Internal buffer size handed to the codec stream.
const STREAM_BUFFER_SIZE: usize = 10 * 1024;

/// The codec's read-failure / end-of-stream sentinel: (OPJ_SIZE_T)-1.
const READ_FAILURE: usize = usize::MAX;

/// The codec's skip-failure sentinel.
const SKIP_FAILURE: i64 = -1;

/// Any seekable byte source a JP2 asset can be decoded from.
pub trait ByteSource: Read + Seek + Send {}
impl<T: Read + Seek + Send> ByteSource for T {}

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

static STREAMS: LazyLock<Mutex<HashMap<u64, Box<dyn ByteSource>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn register(source: Box<dyn ByteSource>) -> u64 {
    let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
    STREAMS.lock().unwrap().insert(id, source);
    id
}

fn deregister(id: u64) {
    STREAMS.lock().unwrap().remove(&id);
}

/// Number of currently registered byte sources.
pub fn registered_sources() -> usize {
    STREAMS.lock().unwrap().len()
}

fn with_source<T>(id: u64, f: impl FnOnce(&mut dyn ByteSource) -> T) -> Option<T> {
    let mut streams = STREAMS.lock().unwrap();
    streams.get_mut(&id).map(|s| f(s.as_mut()))
}

// =============================================================================
// Codec callbacks
// =============================================================================

unsafe extern "C" fn stream_read(
    buffer: *mut c_void,
    nb_bytes: usize,
    user_data: *mut c_void,
) -> usize {
    let id = user_data as usize as u64;
    if buffer.is_null() || nb_bytes == 0 {
        return READ_FAILURE;
    }
    let out = std::slice::from_raw_parts_mut(buffer as *mut u8, nb_bytes);
    match with_source(id, |s| s.read(out)) {
        // 0 bytes read means end of stream, which the codec expects as the
        // failure sentinel rather than a short read.
        Some(Ok(0)) => READ_FAILURE,
        Some(Ok(n)) => n,
        Some(Err(e)) => {
            error!(stream = id, "unable to read from stream: {e}");
            READ_FAILURE
        }
        None => {
            error!(stream = id, "unable to find stream");
            READ_FAILURE
        }
    }
}

unsafe extern "C" fn stream_skip(nb_bytes: i64, user_data: *mut c_void) -> i64 {
    let id = user_data as usize as u64;
    match with_source(id, |s| s.seek(SeekFrom::Current(nb_bytes))) {
        // Success is reported as the number of bytes requested.
        Some(Ok(_)) => nb_bytes,
        Some(Err(e)) => {
            error!(stream = id, "unable to skip {nb_bytes} bytes: {e}");
            SKIP_FAILURE
        }
        None => {
            error!(stream = id, "unable to find stream");
            SKIP_FAILURE
        }
    }
}

unsafe extern "C" fn stream_seek(offset: i64, user_data: *mut c_void) -> i32 {
    let id = user_data as usize as u64;
    if offset < 0 {
        return 0;
    }
    match with_source(id, |s| s.seek(SeekFrom::Start(offset as u64))) {
        Some(Ok(_)) => 1,
        Some(Err(e)) => {
            error!(stream = id, "unable to seek to offset {offset}: {e}");
            0
        }
        None => {
            error!(stream = id, "unable to find stream");
            0
        }
    }
}

// =============================================================================
// Stream handle
// =============================================================================

/// An open codec stream bound to a registered byte source.
///
/// Dropping the handle destroys the codec stream and removes the registry
/// entry, so every exit path of the decode pipeline releases both.
pub(crate) struct Stream {
    raw: *mut opj::opj_stream_t,
    id: u64,
}

impl Stream {
    pub fn open(source: Box<dyn ByteSource>, length: u64) -> Result<Self, ImageError> {
        let id = register(source);
        let raw = unsafe { opj::opj_stream_create(STREAM_BUFFER_SIZE, 1) };
        if raw.is_null() {
            deregister(id);
            return Err(ImageError::Decode("unable to create codec stream".to_string()));
        }
        unsafe {
            opj::opj_stream_set_read_function(raw, Some(stream_read));
            opj::opj_stream_set_skip_function(raw, Some(stream_skip));
            opj::opj_stream_set_seek_function(raw, Some(stream_seek));
            opj::opj_stream_set_user_data(raw, id as usize as *mut c_void, None);
            opj::opj_stream_set_user_data_length(raw, length);
        }
        Ok(Stream { raw, id })
    }

    pub fn as_ptr(&self) -> *mut opj::opj_stream_t {
        self.raw
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        unsafe { opj::opj_stream_destroy(self.raw) };
        deregister(self.id);
    }
}

// Raw codec pointers never leave the owning request.
unsafe impl Send for Stream {}

// =============================================================================
// Tests
// =============================================================================
