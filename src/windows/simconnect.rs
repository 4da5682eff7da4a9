//! Live SimConnect transport
//!
//! Loads `SimConnect.dll` at runtime and resolves the handful of entry points
//! the bridge needs. Every call is non-blocking; the dispatch queue is polled
//! with `SimConnect_GetNextDispatch`, which reports an empty queue as `E_FAIL`.

use async_trait::async_trait;
use std::ffi::{CString, c_char, c_void};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};
use windows::Win32::Foundation::{FreeLibrary, HMODULE};
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
use windows::core::{PCSTR, PCWSTR, s};

use crate::transport::Transport;
use crate::types::{
    DataType, DefinitionId, EventId, GroupId, ObjectId, Period, RequestFlags, RequestId,
    SimObjectType, UNUSED,
};
use crate::{BridgeError, Result};

/// File name of the vendor library
pub const LIBRARY_NAME: &str = "SimConnect.dll";

/// `GetNextDispatch` result for an empty queue
const E_FAIL: i32 = 0x8000_4005_u32 as i32;

type Handle = *mut c_void;
type HResult = i32;

type OpenFn = unsafe extern "system" fn(
    *mut Handle,
    *const c_char,
    *mut c_void,
    u32,
    *mut c_void,
    u32,
) -> HResult;
type CloseFn = unsafe extern "system" fn(Handle) -> HResult;
type AddToDataDefinitionFn =
    unsafe extern "system" fn(Handle, u32, *const c_char, *const c_char, u32, f32, u32) -> HResult;
type RequestDataOnSimObjectFn =
    unsafe extern "system" fn(Handle, u32, u32, u32, u32, u32, u32, u32, u32) -> HResult;
type RequestDataOnSimObjectTypeFn =
    unsafe extern "system" fn(Handle, u32, u32, u32, u32) -> HResult;
type MapClientEventToSimEventFn =
    unsafe extern "system" fn(Handle, u32, *const c_char) -> HResult;
type AddClientEventToNotificationGroupFn =
    unsafe extern "system" fn(Handle, u32, u32, i32) -> HResult;
type SetNotificationGroupPriorityFn = unsafe extern "system" fn(Handle, u32, u32) -> HResult;
type TransmitClientEventFn =
    unsafe extern "system" fn(Handle, u32, u32, u32, u32, u32) -> HResult;
type GetNextDispatchFn = unsafe extern "system" fn(Handle, *mut *mut u8, *mut u32) -> HResult;

/// Loaded library and resolved entry points.
struct Api {
    module: HMODULE,
    open: OpenFn,
    close: CloseFn,
    add_to_data_definition: AddToDataDefinitionFn,
    request_data_on_sim_object: RequestDataOnSimObjectFn,
    request_data_on_sim_object_type: RequestDataOnSimObjectTypeFn,
    map_client_event_to_sim_event: MapClientEventToSimEventFn,
    add_client_event_to_notification_group: AddClientEventToNotificationGroupFn,
    set_notification_group_priority: SetNotificationGroupPriorityFn,
    transmit_client_event: TransmitClientEventFn,
    get_next_dispatch: GetNextDispatchFn,
}

/// Resolve `name` and reinterpret it as the function pointer type `F`.
///
/// # Safety
/// `F` must be the exact signature of the exported function.
unsafe fn resolve<F: Copy>(module: HMODULE, name: PCSTR, label: &str) -> Result<F> {
    let proc = unsafe { GetProcAddress(module, name) }.ok_or_else(|| {
        BridgeError::setup_failed(format!("{} does not export {}", LIBRARY_NAME, label))
    })?;
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of_val(&proc));
    Ok(unsafe { std::mem::transmute_copy::<_, F>(&proc) })
}

impl Api {
    fn load(search_dir: Option<&Path>) -> Result<Self> {
        let path = match search_dir {
            Some(dir) => dir.join(LIBRARY_NAME),
            None => PathBuf::from(LIBRARY_NAME),
        };
        debug!("Loading {}", path.display());

        let wide = wide_path(&path);
        let module = unsafe { LoadLibraryW(PCWSTR::from_raw(wide.as_ptr())) }.map_err(|e| {
            BridgeError::setup_failed_with_source(
                format!("failed to load {}", path.display()),
                Box::new(e),
            )
        })?;

        let resolved = unsafe { Self::resolve_all(module) };
        if resolved.is_err() {
            let _ = unsafe { FreeLibrary(module) };
        }
        resolved
    }

    unsafe fn resolve_all(module: HMODULE) -> Result<Self> {
        unsafe {
            Ok(Self {
                module,
                open: resolve(module, s!("SimConnect_Open"), "SimConnect_Open")?,
                close: resolve(module, s!("SimConnect_Close"), "SimConnect_Close")?,
                add_to_data_definition: resolve(
                    module,
                    s!("SimConnect_AddToDataDefinition"),
                    "SimConnect_AddToDataDefinition",
                )?,
                request_data_on_sim_object: resolve(
                    module,
                    s!("SimConnect_RequestDataOnSimObject"),
                    "SimConnect_RequestDataOnSimObject",
                )?,
                request_data_on_sim_object_type: resolve(
                    module,
                    s!("SimConnect_RequestDataOnSimObjectType"),
                    "SimConnect_RequestDataOnSimObjectType",
                )?,
                map_client_event_to_sim_event: resolve(
                    module,
                    s!("SimConnect_MapClientEventToSimEvent"),
                    "SimConnect_MapClientEventToSimEvent",
                )?,
                add_client_event_to_notification_group: resolve(
                    module,
                    s!("SimConnect_AddClientEventToNotificationGroup"),
                    "SimConnect_AddClientEventToNotificationGroup",
                )?,
                set_notification_group_priority: resolve(
                    module,
                    s!("SimConnect_SetNotificationGroupPriority"),
                    "SimConnect_SetNotificationGroupPriority",
                )?,
                transmit_client_event: resolve(
                    module,
                    s!("SimConnect_TransmitClientEvent"),
                    "SimConnect_TransmitClientEvent",
                )?,
                get_next_dispatch: resolve(
                    module,
                    s!("SimConnect_GetNextDispatch"),
                    "SimConnect_GetNextDispatch",
                )?,
            })
        }
    }
}

impl Drop for Api {
    fn drop(&mut self) {
        unsafe {
            let _ = FreeLibrary(self.module);
        }
    }
}

/// An open SimConnect connection.
pub struct SimConnectTransport {
    api: Api,
    handle: Handle,
    closed: bool,
}

impl SimConnectTransport {
    /// Load the library and open a connection announced as `client_name`.
    ///
    /// `search_dir` is tried instead of the default DLL search order when
    /// given. Fails if the simulator is not running.
    pub fn open(client_name: &str, search_dir: Option<&Path>) -> Result<Self> {
        let api = Api::load(search_dir)?;
        let name = c_string("client name", client_name)?;

        let mut handle: Handle = std::ptr::null_mut();
        let hr = unsafe {
            (api.open)(&mut handle, name.as_ptr(), std::ptr::null_mut(), 0, std::ptr::null_mut(), 0)
        };
        if hr < 0 || handle.is_null() {
            return Err(BridgeError::setup_failed(format!(
                "SimConnect_Open failed ({:#010x}); is the simulator running?",
                hr
            )));
        }

        info!("Opened SimConnect connection as '{}'", client_name);
        Ok(Self { api, handle, closed: false })
    }

    fn live_handle(&self) -> Result<Handle> {
        if self.closed { Err(BridgeError::Closed) } else { Ok(self.handle) }
    }
}

fn check(operation: &'static str, hr: HResult) -> Result<()> {
    if hr < 0 {
        warn!(operation, code = format_args!("{:#010x}", hr), "SimConnect call failed");
        Err(BridgeError::request_failed(operation, hr))
    } else {
        Ok(())
    }
}

#[async_trait]
impl Transport for SimConnectTransport {
    async fn add_to_data_definition(
        &mut self,
        definition: DefinitionId,
        name: &str,
        unit: &str,
        data_type: DataType,
    ) -> Result<()> {
        let handle = self.live_handle()?;
        let name = c_string("variable name", name)?;
        let unit = c_string("unit", unit)?;
        let hr = unsafe {
            (self.api.add_to_data_definition)(
                handle,
                definition.raw(),
                name.as_ptr(),
                unit.as_ptr(),
                data_type.wire_value(),
                0.0,
                UNUSED,
            )
        };
        check("AddToDataDefinition", hr)
    }

    async fn request_data_on_sim_object(
        &mut self,
        request: RequestId,
        definition: DefinitionId,
        object: ObjectId,
        period: Period,
        flags: RequestFlags,
    ) -> Result<()> {
        let handle = self.live_handle()?;
        let hr = unsafe {
            (self.api.request_data_on_sim_object)(
                handle,
                request.raw(),
                definition.raw(),
                object.0,
                period.wire_value(),
                flags.wire_value(),
                0,
                0,
                0,
            )
        };
        check("RequestDataOnSimObject", hr)
    }

    async fn request_data_on_sim_object_type(
        &mut self,
        request: RequestId,
        definition: DefinitionId,
        radius_meters: u32,
        object_type: SimObjectType,
    ) -> Result<()> {
        let handle = self.live_handle()?;
        let hr = unsafe {
            (self.api.request_data_on_sim_object_type)(
                handle,
                request.raw(),
                definition.raw(),
                radius_meters,
                object_type.wire_value(),
            )
        };
        check("RequestDataOnSimObjectType", hr)
    }

    async fn map_client_event_to_sim_event(
        &mut self,
        event: EventId,
        sim_event: &str,
    ) -> Result<()> {
        let handle = self.live_handle()?;
        let sim_event = c_string("event name", sim_event)?;
        let hr = unsafe {
            (self.api.map_client_event_to_sim_event)(handle, event.raw(), sim_event.as_ptr())
        };
        check("MapClientEventToSimEvent", hr)
    }

    async fn add_client_event_to_notification_group(
        &mut self,
        group: GroupId,
        event: EventId,
        maskable: bool,
    ) -> Result<()> {
        let handle = self.live_handle()?;
        let hr = unsafe {
            (self.api.add_client_event_to_notification_group)(
                handle,
                group.raw(),
                event.raw(),
                i32::from(maskable),
            )
        };
        check("AddClientEventToNotificationGroup", hr)
    }

    async fn set_notification_group_priority(
        &mut self,
        group: GroupId,
        priority: u32,
    ) -> Result<()> {
        let handle = self.live_handle()?;
        let hr =
            unsafe { (self.api.set_notification_group_priority)(handle, group.raw(), priority) };
        check("SetNotificationGroupPriority", hr)
    }

    async fn transmit_client_event(
        &mut self,
        object: ObjectId,
        event: EventId,
        data: u32,
        group: u32,
        flags: u32,
    ) -> Result<()> {
        let handle = self.live_handle()?;
        let hr = unsafe {
            (self.api.transmit_client_event)(handle, object.0, event.raw(), data, group, flags)
        };
        check("TransmitClientEvent", hr)
    }

    async fn get_next_dispatch(&mut self) -> Result<Option<Vec<u8>>> {
        let handle = self.live_handle()?;
        let mut data: *mut u8 = std::ptr::null_mut();
        let mut size: u32 = 0;

        let hr = unsafe { (self.api.get_next_dispatch)(handle, &mut data, &mut size) };
        if hr == E_FAIL {
            return Ok(None);
        }
        if hr < 0 {
            return Err(BridgeError::transport(hr));
        }
        if data.is_null() || size == 0 {
            return Ok(None);
        }

        // the buffer belongs to SimConnect and is only valid until the next call
        let frame = unsafe { std::slice::from_raw_parts(data, size as usize) }.to_vec();
        trace!(bytes = frame.len(), "Dispatch frame");
        Ok(Some(frame))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let hr = unsafe { (self.api.close)(self.handle) };
        debug!("SimConnect connection closed");
        check("Close", hr)
    }
}

impl Drop for SimConnectTransport {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            unsafe {
                let _ = (self.api.close)(self.handle);
            }
        }
    }
}

// SAFETY: the handle and module are only used from the single task that owns
// the transport; SimConnect handles may be used from any thread.
unsafe impl Send for SimConnectTransport {}

fn c_string(context: &str, value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| BridgeError::parse_error(context, format!("'{}' contains a NUL byte", value)))
}

/// Convert a path to a null-terminated wide string for Windows APIs
fn wide_path(path: &Path) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    path.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
}
