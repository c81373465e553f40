//! Windows backend. The engine only reads typed characters from its graphic
//! window, so input is posted as `WM_CHAR` messages to the control whose class
//! name matches the configured input class.

use super::{ChildGuard, EngineHost, EngineProcess, LaunchSpec};
use crate::errors::{AppError, AppResult};
use std::collections::HashMap;
use std::ffi::c_void;
use std::process::{Command, Stdio};
use std::time::Instant;
use windows::Win32::Foundation::{CloseHandle, BOOL, FALSE, FILETIME, HANDLE, HWND, LPARAM, TRUE, WPARAM};
use windows::Win32::System::Threading::{GetProcessTimes, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumChildWindows, EnumWindows, GetClassNameW, GetWindowThreadProcessId, PostMessageW, ShowWindow,
    SW_SHOWMINNOACTIVE, WM_CHAR,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Host;

impl EngineHost for Win32Host {
    fn launch(&self, spec: &LaunchSpec) -> AppResult<Box<dyn EngineProcess>> {
        let mut command = Command::new(&spec.program);
        command
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let guard = ChildGuard::spawn(&mut command, spec)?;
        let process = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, guard.pid()) }
            .map_err(|error| AppError::Io(format!("cannot open engine process: {}", error)))?;
        let mut engine = Win32Process {
            guard,
            process: process.0 as isize,
            input_class: spec.input_class.clone(),
            input_window: None,
            last_cpu_time: 0,
            last_sampled_at: Instant::now(),
        };
        engine.last_cpu_time = engine.cpu_time().unwrap_or(0);
        Ok(Box::new(engine))
    }
}

pub struct Win32Process {
    guard: ChildGuard,
    // Raw handles are kept as integers so the process can move between threads.
    process: isize,
    input_class: String,
    input_window: Option<isize>,
    last_cpu_time: u64,
    last_sampled_at: Instant,
}

struct WindowScan {
    pid: u32,
    by_class: HashMap<String, isize>,
    top_level: Vec<isize>,
}

impl Win32Process {
    fn process_handle(&self) -> HANDLE {
        HANDLE(self.process as *mut c_void)
    }

    /// Kernel + user time in 100ns units.
    fn cpu_time(&self) -> AppResult<u64> {
        let mut creation = FILETIME::default();
        let mut exit = FILETIME::default();
        let mut kernel = FILETIME::default();
        let mut user = FILETIME::default();
        unsafe { GetProcessTimes(self.process_handle(), &mut creation, &mut exit, &mut kernel, &mut user) }
            .map_err(|error| AppError::Script(format!("engine process gone: {}", error)))?;
        Ok(filetime_to_u64(kernel) + filetime_to_u64(user))
    }

    fn scan_windows(&self) -> WindowScan {
        let mut scan = WindowScan {
            pid: self.guard.pid(),
            by_class: HashMap::new(),
            top_level: Vec::new(),
        };
        // A failed enumeration just means the engine has no window yet.
        let _ = unsafe { EnumWindows(Some(enum_top_level), LPARAM(&mut scan as *mut WindowScan as isize)) };
        scan
    }
}

fn filetime_to_u64(time: FILETIME) -> u64 {
    (u64::from(time.dwHighDateTime) << 32) | u64::from(time.dwLowDateTime)
}

fn class_name(hwnd: HWND) -> String {
    let mut buf = [0u16; 256];
    let len = unsafe { GetClassNameW(hwnd, &mut buf) };
    let len = usize::try_from(len).unwrap_or(0).min(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

unsafe extern "system" fn enum_top_level(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let scan = &mut *(lparam.0 as *mut WindowScan);
    let mut owner = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut owner as *mut u32));
    if owner == scan.pid {
        scan.top_level.push(hwnd.0 as isize);
        scan.by_class.insert(class_name(hwnd), hwnd.0 as isize);
        // EnumChildWindows already descends into grandchildren.
        let _ = EnumChildWindows(hwnd, Some(enum_child), lparam);
    }
    TRUE
}

unsafe extern "system" fn enum_child(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let scan = &mut *(lparam.0 as *mut WindowScan);
    scan.by_class.insert(class_name(hwnd), hwnd.0 as isize);
    TRUE
}

impl EngineProcess for Win32Process {
    fn pid(&self) -> u32 {
        self.guard.pid()
    }

    fn locate_input_surface(&mut self) -> AppResult<bool> {
        if self.input_window.is_some() {
            return Ok(true);
        }
        if self.guard.has_exited() {
            return Err(AppError::Script("engine exited before opening its window".to_string()));
        }
        let scan = self.scan_windows();
        let Some(hwnd) = scan.by_class.get(&self.input_class).copied() else {
            return Ok(false);
        };
        for window in &scan.top_level {
            let _ = unsafe { ShowWindow(HWND(*window as *mut c_void), SW_SHOWMINNOACTIVE) };
        }
        tracing::debug!(pid = self.guard.pid(), class = %self.input_class, "engine input window located");
        self.input_window = Some(hwnd);
        Ok(true)
    }

    fn send_keystroke(&mut self, ch: char) -> AppResult<()> {
        let Some(hwnd) = self.input_window else {
            return Err(AppError::Script("input window not located".to_string()));
        };
        unsafe {
            PostMessageW(
                HWND(hwnd as *mut c_void),
                WM_CHAR,
                WPARAM(ch as usize),
                LPARAM(0),
            )
        }
        .map_err(|error| AppError::Script(format!("keystroke not delivered: {}", error)))
    }

    fn sample_cpu(&mut self) -> AppResult<f64> {
        let cpu_time = self.cpu_time()?;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_sampled_at).as_secs_f64();
        let delta = cpu_time.saturating_sub(self.last_cpu_time);
        self.last_cpu_time = cpu_time;
        self.last_sampled_at = now;
        if delta == 0 || elapsed <= 0.0 {
            return Ok(0.0);
        }
        // FILETIME ticks are 100ns.
        Ok(delta as f64 / 10_000_000.0 / elapsed * 100.0)
    }

    fn terminate(&mut self) {
        self.input_window = None;
        self.guard.terminate();
    }
}

impl Drop for Win32Process {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.process_handle()) };
    }
}
