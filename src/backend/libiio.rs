//! libiio backend for real hardware
//!
//! Thin FFI bindings to the system libiio (v0 API) implementing the
//! [`IioTransport`] family of traits. Compiled only with the `libiio`
//! feature; `build.rs` adds the link directive.
//!
//! Every device, channel and buffer handle keeps the owning context alive
//! through a shared [`ContextHandle`], so the context is destroyed only
//! after the last handle into it is dropped.

use super::iio_trait::{ContextInfo, IioBuffer, IioChannel, IioContext, IioDevice, IioTransport};
use crate::error::{AcqError, Result};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_longlong, c_uint, c_void};
use std::sync::Arc;

#[repr(C)]
struct RawScanContext {
    _private: [u8; 0],
}

#[repr(C)]
struct RawContextInfo {
    _private: [u8; 0],
}

#[repr(C)]
struct RawContext {
    _private: [u8; 0],
}

#[repr(C)]
struct RawDevice {
    _private: [u8; 0],
}

#[repr(C)]
struct RawChannel {
    _private: [u8; 0],
}

#[repr(C)]
struct RawBuffer {
    _private: [u8; 0],
}

extern "C" {
    fn iio_create_scan_context(backend: *const c_char, flags: c_uint) -> *mut RawScanContext;
    fn iio_scan_context_destroy(ctx: *mut RawScanContext);
    fn iio_scan_context_get_info_list(
        ctx: *mut RawScanContext,
        info: *mut *mut *mut RawContextInfo,
    ) -> isize;
    fn iio_context_info_list_free(info: *mut *mut RawContextInfo);
    fn iio_context_info_get_description(info: *const RawContextInfo) -> *const c_char;
    fn iio_context_info_get_uri(info: *const RawContextInfo) -> *const c_char;

    fn iio_create_context_from_uri(uri: *const c_char) -> *mut RawContext;
    fn iio_context_destroy(ctx: *mut RawContext);
    fn iio_context_find_device(ctx: *const RawContext, name: *const c_char) -> *mut RawDevice;

    fn iio_device_get_name(dev: *const RawDevice) -> *const c_char;
    fn iio_device_find_channel(
        dev: *const RawDevice,
        name: *const c_char,
        output: bool,
    ) -> *mut RawChannel;
    fn iio_device_debug_attr_read_longlong(
        dev: *const RawDevice,
        attr: *const c_char,
        val: *mut c_longlong,
    ) -> c_int;
    fn iio_device_debug_attr_write_longlong(
        dev: *const RawDevice,
        attr: *const c_char,
        val: c_longlong,
    ) -> c_int;
    fn iio_device_reg_read(dev: *mut RawDevice, addr: u32, value: *mut u32) -> c_int;
    fn iio_device_reg_write(dev: *mut RawDevice, addr: u32, value: u32) -> c_int;
    fn iio_device_set_kernel_buffers_count(dev: *const RawDevice, nb_buffers: c_uint) -> c_int;
    fn iio_device_create_buffer(
        dev: *const RawDevice,
        samples_count: usize,
        cyclic: bool,
    ) -> *mut RawBuffer;

    fn iio_channel_attr_write(chn: *const RawChannel, attr: *const c_char, src: *const c_char)
        -> isize;
    fn iio_channel_attr_write_longlong(
        chn: *const RawChannel,
        attr: *const c_char,
        val: c_longlong,
    ) -> c_int;
    fn iio_channel_attr_write_double(chn: *const RawChannel, attr: *const c_char, val: f64)
        -> c_int;
    fn iio_channel_attr_write_bool(chn: *const RawChannel, attr: *const c_char, val: bool)
        -> c_int;
    fn iio_channel_enable(chn: *mut RawChannel);
    fn iio_channel_disable(chn: *mut RawChannel);
    fn iio_channel_is_enabled(chn: *const RawChannel) -> bool;

    fn iio_buffer_refill(buf: *mut RawBuffer) -> isize;
    fn iio_buffer_start(buf: *const RawBuffer) -> *mut c_void;
    fn iio_buffer_destroy(buf: *mut RawBuffer);
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| AcqError::Config(format!("interior NUL in {:?}", value)))
}

fn check(operation: &str, code: i64) -> Result<()> {
    if code < 0 {
        Err(AcqError::Hardware {
            operation: operation.to_string(),
            code: code as i32,
        })
    } else {
        Ok(())
    }
}

fn last_errno(operation: &str) -> AcqError {
    AcqError::Hardware {
        operation: operation.to_string(),
        code: -std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
    }
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string valid for the call.
unsafe fn owned_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

// ==================== Transport ====================

/// Scans and opens contexts through libiio
#[derive(Debug, Default, Clone, Copy)]
pub struct LibIioTransport;

impl LibIioTransport {
    pub fn new() -> Self {
        Self
    }
}

impl IioTransport for LibIioTransport {
    fn scan(&self, schemes: &str) -> Result<Vec<ContextInfo>> {
        let backend = c_string(schemes)?;
        unsafe {
            let scan = iio_create_scan_context(backend.as_ptr(), 0);
            if scan.is_null() {
                return Err(AcqError::Discovery(format!(
                    "could not create scan context for {}",
                    schemes
                )));
            }

            let mut list: *mut *mut RawContextInfo = std::ptr::null_mut();
            let count = iio_scan_context_get_info_list(scan, &mut list);
            if count < 0 {
                iio_scan_context_destroy(scan);
                return Err(AcqError::Discovery(format!("scan failed: code {}", count)));
            }

            let mut infos = Vec::with_capacity(count as usize);
            for i in 0..count as usize {
                let info = *list.add(i);
                infos.push(ContextInfo::new(
                    owned_string(iio_context_info_get_description(info)),
                    owned_string(iio_context_info_get_uri(info)),
                ));
            }

            if !list.is_null() {
                iio_context_info_list_free(list);
            }
            iio_scan_context_destroy(scan);
            Ok(infos)
        }
    }

    fn open(&self, uri: &str) -> Result<Box<dyn IioContext>> {
        let c_uri = c_string(uri)?;
        let ctx = unsafe { iio_create_context_from_uri(c_uri.as_ptr()) };
        if ctx.is_null() {
            return Err(last_errno(&format!("open {}", uri)));
        }
        Ok(Box::new(LibIioContext {
            handle: Arc::new(ContextHandle(ctx)),
        }))
    }
}

// ==================== Context ====================

struct ContextHandle(*mut RawContext);

// libiio contexts may be used from any thread; calls are serialized by the
// callers (controller thread for attributes, worker thread for the buffer).
unsafe impl Send for ContextHandle {}
unsafe impl Sync for ContextHandle {}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        unsafe { iio_context_destroy(self.0) }
    }
}

struct LibIioContext {
    handle: Arc<ContextHandle>,
}

impl IioContext for LibIioContext {
    fn find_device(&self, name: &str) -> Option<Arc<dyn IioDevice>> {
        let c_name = c_string(name).ok()?;
        let dev = unsafe { iio_context_find_device(self.handle.0, c_name.as_ptr()) };
        if dev.is_null() {
            return None;
        }
        let name = unsafe { owned_string(iio_device_get_name(dev)) };
        Some(Arc::new(LibIioDevice {
            context: self.handle.clone(),
            dev,
            name,
        }))
    }
}

// ==================== Device ====================

struct LibIioDevice {
    context: Arc<ContextHandle>,
    dev: *mut RawDevice,
    name: String,
}

unsafe impl Send for LibIioDevice {}
unsafe impl Sync for LibIioDevice {}

impl IioDevice for LibIioDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_channel(&self, id: &str, output: bool) -> Option<Arc<dyn IioChannel>> {
        let c_id = c_string(id).ok()?;
        let chn = unsafe { iio_device_find_channel(self.dev, c_id.as_ptr(), output) };
        if chn.is_null() {
            return None;
        }
        Some(Arc::new(LibIioChannel {
            _context: self.context.clone(),
            chn,
            id: id.to_string(),
        }))
    }

    fn debug_attr_read_i64(&self, attr: &str) -> Result<i64> {
        let c_attr = c_string(attr)?;
        let mut value: c_longlong = 0;
        let code = unsafe { iio_device_debug_attr_read_longlong(self.dev, c_attr.as_ptr(), &mut value) };
        check(&format!("read debug attr {}", attr), i64::from(code))?;
        Ok(value)
    }

    fn debug_attr_write_i64(&self, attr: &str, value: i64) -> Result<()> {
        let c_attr = c_string(attr)?;
        let code = unsafe { iio_device_debug_attr_write_longlong(self.dev, c_attr.as_ptr(), value) };
        check(&format!("write debug attr {}", attr), i64::from(code))
    }

    fn reg_read(&self, address: u32) -> Result<u32> {
        let mut value = 0u32;
        let code = unsafe { iio_device_reg_read(self.dev, address, &mut value) };
        check(&format!("read reg 0x{:08X}", address), i64::from(code))?;
        Ok(value)
    }

    fn reg_write(&self, address: u32, value: u32) -> Result<()> {
        let code = unsafe { iio_device_reg_write(self.dev, address, value) };
        check(&format!("write reg 0x{:08X}", address), i64::from(code))
    }

    fn set_kernel_buffers_count(&self, count: usize) -> Result<()> {
        let count = c_uint::try_from(count).unwrap_or(c_uint::MAX);
        let code = unsafe { iio_device_set_kernel_buffers_count(self.dev, count) };
        check("set kernel buffers count", i64::from(code))
    }

    fn create_buffer(&self, samples: usize) -> Result<Box<dyn IioBuffer>> {
        let buf = unsafe { iio_device_create_buffer(self.dev, samples, false) };
        if buf.is_null() {
            return Err(last_errno("create buffer"));
        }
        Ok(Box::new(LibIioBuffer {
            _context: self.context.clone(),
            buf,
            len: 0,
        }))
    }
}

// ==================== Channel ====================

struct LibIioChannel {
    _context: Arc<ContextHandle>,
    chn: *mut RawChannel,
    id: String,
}

unsafe impl Send for LibIioChannel {}
unsafe impl Sync for LibIioChannel {}

impl IioChannel for LibIioChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn attr_write_str(&self, attr: &str, value: &str) -> Result<()> {
        let c_attr = c_string(attr)?;
        let c_value = c_string(value)?;
        let written = unsafe { iio_channel_attr_write(self.chn, c_attr.as_ptr(), c_value.as_ptr()) };
        check(&format!("write {}", attr), written as i64)
    }

    fn attr_write_i64(&self, attr: &str, value: i64) -> Result<()> {
        let c_attr = c_string(attr)?;
        let code = unsafe { iio_channel_attr_write_longlong(self.chn, c_attr.as_ptr(), value) };
        check(&format!("write {}", attr), i64::from(code))
    }

    fn attr_write_f64(&self, attr: &str, value: f64) -> Result<()> {
        let c_attr = c_string(attr)?;
        let code = unsafe { iio_channel_attr_write_double(self.chn, c_attr.as_ptr(), value) };
        check(&format!("write {}", attr), i64::from(code))
    }

    fn attr_write_bool(&self, attr: &str, value: bool) -> Result<()> {
        let c_attr = c_string(attr)?;
        let code = unsafe { iio_channel_attr_write_bool(self.chn, c_attr.as_ptr(), value) };
        check(&format!("write {}", attr), i64::from(code))
    }

    fn enable(&self) {
        unsafe { iio_channel_enable(self.chn) }
    }

    fn disable(&self) {
        unsafe { iio_channel_disable(self.chn) }
    }

    fn is_enabled(&self) -> bool {
        unsafe { iio_channel_is_enabled(self.chn) }
    }
}

// ==================== Buffer ====================

struct LibIioBuffer {
    _context: Arc<ContextHandle>,
    buf: *mut RawBuffer,
    /// Bytes returned by the last refill
    len: usize,
}

// Owned by exactly one worker thread at a time
unsafe impl Send for LibIioBuffer {}

impl IioBuffer for LibIioBuffer {
    fn refill(&mut self) -> Result<usize> {
        let bytes = unsafe { iio_buffer_refill(self.buf) };
        check("refill", bytes as i64)?;
        self.len = bytes as usize;
        Ok(self.len)
    }

    fn as_bytes(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        unsafe {
            let start = iio_buffer_start(self.buf) as *const u8;
            if start.is_null() {
                return &[];
            }
            std::slice::from_raw_parts(start, self.len)
        }
    }
}

impl Drop for LibIioBuffer {
    fn drop(&mut self) {
        unsafe { iio_buffer_destroy(self.buf) }
    }
}
