//! Fixed binary layout of an [`ExecutionContext`].
//!
//! Already-compiled modules read this record by offset. Any change to field order, width or
//! padding is a protocol break and must bump [`CONTEXT_LAYOUT_VERSION`].
//!
//! All integers are little-endian. Strings are UTF-8, NUL-padded, and must leave room for at
//! least one terminating NUL. The super context is stored by program id, never by address.

use crate::context::{ExecutionContext, ProgramLogSettings, TestFlags};
use crate::error::SyncError;
use crate::types::{
    DeinitFlags, Hwnd, InitFlags, InitializeReason, LaunchType, ModuleType, Phase, ProgramId,
    ProgramType, ThreadId, Timeframe, UninitializeReason,
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

pub const CONTEXT_LAYOUT_VERSION: u32 = 3;

pub const NAME_WIDTH: usize = 64;
pub const SYMBOL_WIDTH: usize = 12;
pub const LOG_LEVEL_WIDTH: usize = 8;
pub const PATH_WIDTH: usize = 260;

/// Size in bytes of one encoded context.
pub const CONTEXT_RECORD_SIZE: usize = 4 * 4 // version, pid, previous_pid, program_type
    + NAME_WIDTH
    + 4 // module_type
    + NAME_WIDTH
    + 4 * 7 // launch_type, super_pid, init_flags, deinit_flags, phase, init_reason, uninit_reason
    + SYMBOL_WIDTH
    + 4 * 3 // timeframe, chart, chart_window
    + 4 // test flags + pad
    + 4 // thread_id
    + 8 // ticks
    + 8 // last_tick_at (unix ms, 0 = never)
    + 4 * 2 // mql_error, dll_error
    + 4 // log flags + pad
    + LOG_LEVEL_WIDTH
    + PATH_WIDTH;

/// Encode a context into its wire record.
pub fn encode(ctx: &ExecutionContext) -> Result<Vec<u8>, SyncError> {
    let mut w = RecordWriter::with_capacity(CONTEXT_RECORD_SIZE);

    w.put_u32(CONTEXT_LAYOUT_VERSION);
    w.put_u32(ProgramId::raw(ctx.pid));
    w.put_u32(ProgramId::raw(ctx.previous_pid));
    w.put_u32(ctx.program_type.map(|t| t as u32).unwrap_or(0));
    w.put_str("program_name", &ctx.program_name, NAME_WIDTH)?;
    w.put_u32(ctx.module_type.map(|t| t as u32).unwrap_or(0));
    w.put_str("module_name", &ctx.module_name, NAME_WIDTH)?;
    w.put_u32(ctx.launch_type.map(|t| t as u32).unwrap_or(0));
    w.put_u32(ProgramId::raw(ctx.super_pid));
    w.put_u32(ctx.init_flags.bits());
    w.put_u32(ctx.deinit_flags.bits());
    w.put_u32(ctx.phase as u32);
    w.put_u32(ctx.init_reason.map(|r| r as u32).unwrap_or(0));
    w.put_u32(ctx.uninit_reason as u32);
    w.put_str("symbol", &ctx.symbol, SYMBOL_WIDTH)?;
    w.put_u32(ctx.timeframe.map(Timeframe::minutes).unwrap_or(0));
    w.put_u32(ctx.chart.0);
    w.put_u32(ctx.chart_window.0);
    w.put_bytes(&[
        ctx.test.testing as u8,
        ctx.test.visual_mode as u8,
        ctx.test.optimization as u8,
        0,
    ]);
    w.put_u32(ctx.thread_id.0);
    w.put_u64(ctx.ticks);
    w.put_i64(ctx.last_tick_at.map(|t| t.timestamp_millis()).unwrap_or(0));
    w.put_i32(ctx.mql_error);
    w.put_i32(ctx.dll_error);
    w.put_bytes(&[
        ctx.logging.enabled as u8,
        ctx.logging.mirror_to_terminal as u8,
        0,
        0,
    ]);
    w.put_str("log_level", &ctx.logging.level, LOG_LEVEL_WIDTH)?;
    let log_file = match &ctx.logging.custom_log_file {
        Some(path) => path.to_str().ok_or_else(|| {
            SyncError::InvalidArgument(format!("log file path is not UTF-8: {:?}", path))
        })?,
        None => "",
    };
    w.put_str("custom_log_file", log_file, PATH_WIDTH)?;

    debug_assert_eq!(w.buf.len(), CONTEXT_RECORD_SIZE);
    Ok(w.buf)
}

/// Decode a wire record.
pub fn decode(bytes: &[u8]) -> Result<ExecutionContext, SyncError> {
    if bytes.len() != CONTEXT_RECORD_SIZE {
        return Err(SyncError::InvalidArgument(format!(
            "context record has {} bytes, expected {}",
            bytes.len(),
            CONTEXT_RECORD_SIZE
        )));
    }
    let mut r = RecordReader { bytes, pos: 0 };

    let version = r.u32();
    if version != CONTEXT_LAYOUT_VERSION {
        return Err(SyncError::InvalidArgument(format!(
            "unsupported context layout version {} (expected {})",
            version, CONTEXT_LAYOUT_VERSION
        )));
    }

    let pid = ProgramId::new(r.u32());
    let previous_pid = ProgramId::new(r.u32());
    let program_type = r.code("program_type", ProgramType::from_code)?;
    let program_name = r.str("program_name", NAME_WIDTH)?;
    let module_type = r.code("module_type", ModuleType::from_code)?;
    let module_name = r.str("module_name", NAME_WIDTH)?;
    let launch_type = r.code("launch_type", LaunchType::from_code)?;
    let super_pid = ProgramId::new(r.u32());
    let init_flags = InitFlags::from_bits_truncate(r.u32());
    let deinit_flags = DeinitFlags::from_bits_truncate(r.u32());
    let phase = Phase::from_code(r.u32())
        .ok_or_else(|| SyncError::InvalidArgument("invalid phase code".to_string()))?;
    let init_reason = r.code("init_reason", InitializeReason::from_code)?;
    let uninit_reason = UninitializeReason::from_code(r.u32())
        .ok_or_else(|| SyncError::InvalidArgument("invalid uninit reason code".to_string()))?;
    let symbol = r.str("symbol", SYMBOL_WIDTH)?;
    let timeframe = match r.u32() {
        0 => None,
        minutes => Some(Timeframe::new(minutes as i32)?),
    };
    let chart = Hwnd(r.u32());
    let chart_window = Hwnd(r.u32());
    let test_bytes = r.take(4);
    let test = TestFlags {
        testing: test_bytes[0] != 0,
        visual_mode: test_bytes[1] != 0,
        optimization: test_bytes[2] != 0,
    };
    let thread_id = ThreadId(r.u32());
    let ticks = r.u64();
    let last_tick_at = match r.i64() {
        0 => None,
        ms => Some(DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
            SyncError::InvalidArgument(format!("invalid tick timestamp {}", ms))
        })?),
    };
    let mql_error = r.i32();
    let dll_error = r.i32();
    let log_bytes = r.take(4);
    let enabled = log_bytes[0] != 0;
    let mirror_to_terminal = log_bytes[1] != 0;
    let level = r.str("log_level", LOG_LEVEL_WIDTH)?;
    let log_file = r.str("custom_log_file", PATH_WIDTH)?;

    Ok(ExecutionContext {
        pid,
        previous_pid,
        program_type,
        program_name,
        module_type,
        module_name,
        launch_type,
        super_pid,
        init_flags,
        deinit_flags,
        phase,
        init_reason,
        uninit_reason,
        symbol,
        timeframe,
        chart,
        chart_window,
        test,
        thread_id,
        ticks,
        last_tick_at,
        mql_error,
        dll_error,
        logging: ProgramLogSettings {
            enabled,
            level,
            custom_log_file: (!log_file.is_empty()).then(|| PathBuf::from(log_file)),
            mirror_to_terminal,
        },
    })
}

struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn put_u32(&mut self, v: u32) {
        self.put_bytes(&v.to_le_bytes());
    }

    fn put_i32(&mut self, v: i32) {
        self.put_bytes(&v.to_le_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.put_bytes(&v.to_le_bytes());
    }

    fn put_i64(&mut self, v: i64) {
        self.put_bytes(&v.to_le_bytes());
    }

    fn put_str(&mut self, field: &str, value: &str, width: usize) -> Result<(), SyncError> {
        let bytes = value.as_bytes();
        if bytes.len() >= width {
            return Err(SyncError::InvalidArgument(format!(
                "{} too long: {} bytes (max {})",
                field,
                bytes.len(),
                width - 1
            )));
        }
        if bytes.contains(&0) {
            return Err(SyncError::InvalidArgument(format!(
                "{} contains a NUL byte",
                field
            )));
        }
        self.put_bytes(bytes);
        self.buf.resize(self.buf.len() + (width - bytes.len()), 0);
        Ok(())
    }
}

struct RecordReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    // Length is checked once up front, so slicing cannot run past the end.
    fn take(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        slice
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N));
        out
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.array())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.array())
    }

    fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.array())
    }

    fn code<T>(&mut self, field: &str, parse: fn(u32) -> Option<T>) -> Result<Option<T>, SyncError> {
        match self.u32() {
            0 => Ok(None),
            code => parse(code).map(Some).ok_or_else(|| {
                SyncError::InvalidArgument(format!("invalid {} code {}", field, code))
            }),
        }
    }

    fn str(&mut self, field: &str, width: usize) -> Result<String, SyncError> {
        let raw = self.take(width);
        let end = raw.iter().position(|&b| b == 0).ok_or_else(|| {
            SyncError::InvalidArgument(format!("{} is not NUL-terminated", field))
        })?;
        String::from_utf8(raw[..end].to_vec())
            .map_err(|e| SyncError::InvalidArgument(format!("{} is not UTF-8: {}", field, e)))
    }
}
