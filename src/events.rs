//! Event classification for the compact GDB notification protocol.
//!
//! Every backend line is `<category><subtype>` followed by `;`-separated
//! positional fields. Category `2x` carries breakpoint events, `4x`/`5x`
//! process/execution events, `8x` output text; the remaining digits are
//! reserved. Unknown or malformed lines classify to `None` and are skipped
//! by the dispatcher so that unhandled backend notification types stay
//! non-fatal.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// A classified backend event.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    Breakpoint(BreakpointEvent),
    Execution(ExecutionEvent),
    Output(OutputEvent),
}

/// Breakpoint-lifecycle and breakpoint-hit notifications (category `2x`).
#[derive(Debug, Clone, PartialEq)]
pub enum BreakpointEvent {
    /// `20` — insert confirmation (synchronous).
    Inserted(BreakpointInfo),
    /// `21` — asynchronous modification; carries an updated hit count.
    Modified(BreakpointInfo),
    /// `22` — a temporary breakpoint was removed by the backend.
    TemporaryDeleted { id: u32 },
    /// `23` — enabled; `None` means all breakpoints.
    Enabled { id: Option<u32> },
    /// `24` — disabled; `None` means all breakpoints.
    Disabled { id: Option<u32> },
    /// `25` — deleted; `None` means all breakpoints.
    Deleted { id: Option<u32> },
    /// `26` — ignore-count acknowledgement.
    IgnoreCountSet { id: u32, remaining: u32 },
    /// `27` — the target stopped on a breakpoint.
    Hit {
        id: u32,
        file: String,
        line: u32,
        thread_id: i64,
    },
    /// `28` — condition acknowledgement (empty condition clears it).
    ConditionSet { id: u32, condition: String },
    /// `29` — the backend failed to evaluate a breakpoint condition.
    ConditionError,
}

/// Resolved breakpoint fields as reported by the backend.
///
/// A `<PENDING>` address or `??` function parses to `None`; both mean the
/// location is not resolved yet, never a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakpointInfo {
    pub id: u32,
    pub enabled: bool,
    pub address: Option<u64>,
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub hits: u32,
}

impl BreakpointInfo {
    /// Whether the backend resolved the location to an address.
    pub fn is_resolved(&self) -> bool {
        self.address.is_some()
    }
}

/// Where the target stopped, for interrupt/step/fault notifications. The
/// wire carries between one and five fields; anything absent stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopSite {
    pub address: Option<u64>,
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub thread_id: Option<i64>,
}

impl StopSite {
    /// True when the backend could not name the enclosing function.
    pub fn in_unknown_code(&self) -> bool {
        self.function.is_none()
    }
}

/// Process, thread and execution-control notifications (categories `4x`/`5x`).
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    /// `40`
    ThreadCreated { thread_id: i64, process_id: i64 },
    /// `41` — thread id 0 means all threads.
    Running { thread_id: i64 },
    /// `42`
    ExitedNormally,
    /// `43`
    ExitedWithCode { code: u32 },
    /// `44` — the target was interrupted (user break-all or a
    /// breakpoint-mutation interrupt).
    Interrupted(StopSite),
    /// `45`
    SteppingRangeEnded(StopSite),
    /// `46`
    FunctionFinished(StopSite),
    /// `47` — interrupt acknowledged with nothing else to report.
    InterruptDone { thread_id: i64 },
    /// `48`
    Killed,
    /// `49` — an execution command failed; carries the backend message.
    StepError { message: String },
    /// `50` — one tick of the "Quit (expect signal SIGINT...)" storm.
    QuitSignal,
    /// `51`
    ThreadExited { thread_id: i64 },
    /// `52`/`56` — known backend internal-assertion crash signatures.
    BackendAssertion { detail: String },
    /// `53`
    CommunicationLost,
    /// `54`
    SegmentationFault(StopSite),
    /// `55`
    ExitedSignalled {
        signal: String,
        meaning: String,
        thread_id: Option<i64>,
    },
}

/// Plain text forwarded to the frontend (category `8x`).
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// `80` — backend console text.
    Console(String),
    /// `81` — target stdout text.
    Stdout(String),
}

/// Classifier for single event lines.
pub struct EventParser {
    console_re: Regex,
    stdout_re: Regex,
}

impl EventParser {
    pub fn new() -> Self {
        Self {
            // Output records wrap their payload: 80,"text"!80
            console_re: Regex::new(r#"(?s)^80,"(.*)"!80$"#).unwrap(),
            stdout_re: Regex::new(r#"(?s)^81,"(.*)"!81$"#).unwrap(),
        }
    }

    /// Classify one raw event line. `None` means unknown or malformed and
    /// the line is to be skipped.
    pub fn parse(&self, ev: &str) -> Option<DebugEvent> {
        let mut chars = ev.chars();
        let category = chars.next()?;
        let subtype = chars.next()?;

        let parsed = match category {
            '2' => parse_breakpoint_event(subtype, ev).map(DebugEvent::Breakpoint),
            '4' | '5' => parse_execution_event(category, subtype, ev).map(DebugEvent::Execution),
            '8' => self.parse_output_event(ev).map(DebugEvent::Output),
            // 0x startup, 1x/3x/9x reserved, 6x expressions, 7x stack frames:
            // consumed synchronously or not dispatched.
            _ => None,
        };
        if parsed.is_none() {
            trace!("skipping unclassified event line: {}", ev);
        }
        parsed
    }

    fn parse_output_event(&self, ev: &str) -> Option<OutputEvent> {
        if let Some(caps) = self.console_re.captures(ev) {
            return Some(OutputEvent::Console(caps.get(1)?.as_str().to_string()));
        }
        if let Some(caps) = self.stdout_re.captures(ev) {
            return Some(OutputEvent::Stdout(caps.get(1)?.as_str().to_string()));
        }
        None
    }
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Positional fields after the two-character type code and its separator.
/// Lines whose leading bytes are not single-byte characters carry no
/// fields; they classify to nothing rather than panicking on a slice.
fn fields(ev: &str) -> Vec<&str> {
    match ev.get(3..) {
        Some(rest) if !rest.is_empty() => rest.split(';').collect(),
        _ => Vec::new(),
    }
}

/// Everything after the type code, unsplit (for free-text payloads).
fn payload(ev: &str) -> &str {
    ev.get(3..).unwrap_or("")
}

fn parse_u32(s: &str) -> Option<u32> {
    s.trim().parse().ok()
}

fn parse_i64(s: &str) -> Option<i64> {
    s.trim().parse().ok()
}

/// Hex addresses arrive with or without a `0x` prefix; `<PENDING>` and `??`
/// mean "unresolved".
fn parse_address(s: &str) -> Option<u64> {
    if s == "<PENDING>" || s == "??" {
        return None;
    }
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(digits, 16).ok()
}

/// `??` marks code without symbols.
fn parse_function(s: &str) -> Option<String> {
    if s == "??" || s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Fields of a `20`/`21` record: `id;y|n;addr;func;file;line;hits`.
fn parse_breakpoint_info(ev: &str) -> Option<BreakpointInfo> {
    let f = fields(ev);
    let id = parse_u32(f.first()?)?;
    let enabled = matches!(f.get(1), Some(&"y"));
    let address = f.get(2).and_then(|s| parse_address(s));
    if address.is_none() {
        // Pending location: the backend reports no function/file/line yet.
        return Some(BreakpointInfo {
            id,
            enabled,
            ..Default::default()
        });
    }
    Some(BreakpointInfo {
        id,
        enabled,
        address,
        function: f.get(3).and_then(|s| parse_function(s)),
        file: f.get(4).map(|s| s.to_string()),
        line: f.get(5).and_then(|s| parse_u32(s)),
        hits: f.get(6).and_then(|s| parse_u32(s)).unwrap_or(0),
    })
}

fn parse_breakpoint_event(subtype: char, ev: &str) -> Option<BreakpointEvent> {
    let f = fields(ev);
    match subtype {
        '0' => parse_breakpoint_info(ev).map(BreakpointEvent::Inserted),
        '1' => parse_breakpoint_info(ev).map(BreakpointEvent::Modified),
        '2' => Some(BreakpointEvent::TemporaryDeleted {
            id: parse_u32(f.first()?)?,
        }),
        // An absent id means the operation covered every breakpoint.
        '3' => Some(BreakpointEvent::Enabled {
            id: f.first().and_then(|s| parse_u32(s)),
        }),
        '4' => Some(BreakpointEvent::Disabled {
            id: f.first().and_then(|s| parse_u32(s)),
        }),
        '5' => Some(BreakpointEvent::Deleted {
            id: f.first().and_then(|s| parse_u32(s)),
        }),
        '6' => Some(BreakpointEvent::IgnoreCountSet {
            id: parse_u32(f.first()?)?,
            remaining: parse_u32(f.get(1)?)?,
        }),
        '7' => Some(BreakpointEvent::Hit {
            id: parse_u32(f.first()?)?,
            file: f.get(1)?.to_string(),
            line: parse_u32(f.get(2)?)?,
            thread_id: parse_i64(f.get(3)?)?,
        }),
        '8' => {
            // Condition text may itself contain the separator.
            let mut parts = payload(ev).splitn(2, ';');
            Some(BreakpointEvent::ConditionSet {
                id: parse_u32(parts.next()?)?,
                condition: parts.next().unwrap_or("").to_string(),
            })
        }
        '9' => Some(BreakpointEvent::ConditionError),
        _ => None,
    }
}

/// `44`/`54` records vary in shape; the field count tells them apart:
/// `addr;func;tid`, `addr;func;file;line`, or `addr;func;file;line;tid`.
fn parse_stop_site(ev: &str) -> Option<StopSite> {
    let f = fields(ev);
    let mut site = StopSite {
        address: f.first().and_then(|s| parse_address(s)),
        function: f.get(1).and_then(|s| parse_function(s)),
        ..Default::default()
    };
    match f.len() {
        3 => site.thread_id = parse_i64(f[2]),
        4 => {
            site.file = Some(f[2].to_string());
            site.line = parse_u32(f[3]);
        }
        5 => {
            site.file = Some(f[2].to_string());
            site.line = parse_u32(f[3]);
            site.thread_id = parse_i64(f[4]);
        }
        _ => return None,
    }
    Some(site)
}

/// `45`/`46` records: either `tid` alone (stopped in code without symbols)
/// or `file;line;tid`.
fn parse_step_site(ev: &str) -> Option<StopSite> {
    let f = fields(ev);
    match f.len() {
        1 => Some(StopSite {
            line: Some(1),
            thread_id: parse_i64(f[0]),
            ..Default::default()
        }),
        3 => Some(StopSite {
            file: Some(f[0].to_string()),
            line: parse_u32(f[1]),
            thread_id: parse_i64(f[2]),
            ..Default::default()
        }),
        _ => None,
    }
}

fn parse_execution_event(category: char, subtype: char, ev: &str) -> Option<ExecutionEvent> {
    let f = fields(ev);
    match (category, subtype) {
        ('4', '0') => Some(ExecutionEvent::ThreadCreated {
            thread_id: parse_i64(f.first()?)?,
            process_id: parse_i64(f.get(1)?)?,
        }),
        ('4', '1') => Some(ExecutionEvent::Running {
            thread_id: parse_i64(f.first()?)?,
        }),
        ('4', '2') => Some(ExecutionEvent::ExitedNormally),
        ('4', '3') => Some(ExecutionEvent::ExitedWithCode {
            code: parse_u32(f.first()?)?,
        }),
        ('4', '4') => parse_stop_site(ev).map(ExecutionEvent::Interrupted),
        ('4', '5') => parse_step_site(ev).map(ExecutionEvent::SteppingRangeEnded),
        ('4', '6') => parse_step_site(ev).map(ExecutionEvent::FunctionFinished),
        ('4', '7') => Some(ExecutionEvent::InterruptDone {
            thread_id: parse_i64(f.first()?)?,
        }),
        ('4', '8') => Some(ExecutionEvent::Killed),
        ('4', '9') => Some(ExecutionEvent::StepError {
            message: payload(ev).to_string(),
        }),
        ('5', '0') => Some(ExecutionEvent::QuitSignal),
        ('5', '1') => Some(ExecutionEvent::ThreadExited {
            thread_id: parse_i64(f.first()?)?,
        }),
        ('5', '2') => Some(ExecutionEvent::BackendAssertion {
            detail: "frame_cleanup_after_sniffer assertion failure".to_string(),
        }),
        ('5', '3') => Some(ExecutionEvent::CommunicationLost),
        ('5', '4') => parse_stop_site(ev).map(ExecutionEvent::SegmentationFault),
        ('5', '5') => Some(ExecutionEvent::ExitedSignalled {
            signal: f.first()?.to_string(),
            meaning: f.get(1)?.to_string(),
            thread_id: f.get(2).and_then(|s| parse_i64(s)),
        }),
        ('5', '6') => Some(ExecutionEvent::BackendAssertion {
            detail: "handle_inferior_event assertion failure".to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inserted() {
        let parser = EventParser::new();
        let ev = parser.parse("20;1;y;0x08048564;main;myprog.c;68;0").unwrap();
        match ev {
            DebugEvent::Breakpoint(BreakpointEvent::Inserted(info)) => {
                assert_eq!(info.id, 1);
                assert!(info.enabled);
                assert_eq!(info.address, Some(0x08048564));
                assert_eq!(info.function.as_deref(), Some("main"));
                assert_eq!(info.file.as_deref(), Some("myprog.c"));
                assert_eq!(info.line, Some(68));
                assert_eq!(info.hits, 0);
            }
            other => panic!("expected inserted breakpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pending_insert() {
        let parser = EventParser::new();
        let ev = parser.parse("20;2;y;<PENDING>;??;;0;0").unwrap();
        match ev {
            DebugEvent::Breakpoint(BreakpointEvent::Inserted(info)) => {
                assert_eq!(info.id, 2);
                assert!(!info.is_resolved());
                assert_eq!(info.function, None);
                assert_eq!(info.line, None);
            }
            other => panic!("expected pending breakpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_hit() {
        let parser = EventParser::new();
        let ev = parser.parse("27;1;myprog.c;68;1").unwrap();
        assert_eq!(
            ev,
            DebugEvent::Breakpoint(BreakpointEvent::Hit {
                id: 1,
                file: "myprog.c".to_string(),
                line: 68,
                thread_id: 1,
            })
        );
    }

    #[test]
    fn test_parse_interrupted_shapes() {
        let parser = EventParser::new();
        match parser.parse("44;0x0804d843;main;2").unwrap() {
            DebugEvent::Execution(ExecutionEvent::Interrupted(site)) => {
                assert_eq!(site.address, Some(0x0804d843));
                assert_eq!(site.function.as_deref(), Some("main"));
                assert_eq!(site.thread_id, Some(2));
                assert_eq!(site.file, None);
            }
            other => panic!("unexpected {:?}", other),
        }
        match parser.parse("44;0x0804d843;??;myprog.c;70;1").unwrap() {
            DebugEvent::Execution(ExecutionEvent::Interrupted(site)) => {
                assert!(site.in_unknown_code());
                assert_eq!(site.file.as_deref(), Some("myprog.c"));
                assert_eq!(site.line, Some(70));
                assert_eq!(site.thread_id, Some(1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_step_range_short_and_long() {
        let parser = EventParser::new();
        match parser.parse("45;3").unwrap() {
            DebugEvent::Execution(ExecutionEvent::SteppingRangeEnded(site)) => {
                assert_eq!(site.thread_id, Some(3));
                assert_eq!(site.file, None);
                assert_eq!(site.line, Some(1));
            }
            other => panic!("unexpected {:?}", other),
        }
        match parser.parse("45;myprog.c;70;1").unwrap() {
            DebugEvent::Execution(ExecutionEvent::SteppingRangeEnded(site)) => {
                assert_eq!(site.file.as_deref(), Some("myprog.c"));
                assert_eq!(site.line, Some(70));
                assert_eq!(site.thread_id, Some(1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_exited_signalled() {
        let parser = EventParser::new();
        let ev = parser.parse("55;SIGSEGV;Segmentation fault").unwrap();
        assert_eq!(
            ev,
            DebugEvent::Execution(ExecutionEvent::ExitedSignalled {
                signal: "SIGSEGV".to_string(),
                meaning: "Segmentation fault".to_string(),
                thread_id: None,
            })
        );
    }

    #[test]
    fn test_parse_console_output() {
        let parser = EventParser::new();
        let ev = parser.parse("80,\"[New pid 15380494 tid 2]\\n\"!80").unwrap();
        assert_eq!(
            ev,
            DebugEvent::Output(OutputEvent::Console(
                "[New pid 15380494 tid 2]\\n".to_string()
            ))
        );
    }

    #[test]
    fn test_unknown_lines_are_skipped() {
        let parser = EventParser::new();
        assert_eq!(parser.parse(""), None);
        assert_eq!(parser.parse("9"), None);
        assert_eq!(parser.parse("99;whatever"), None);
        assert_eq!(parser.parse("not an event"), None);
        // Malformed numeric fields classify to nothing instead of erroring.
        assert_eq!(parser.parse("27;xyz;file.c;abc;1"), None);
    }

    #[test]
    fn test_multibyte_garbage_is_skipped() {
        let parser = EventParser::new();
        // Multi-byte characters in the type-code positions must not split
        // the line mid-character.
        assert_eq!(parser.parse("2\u{20AC}x"), None);
        assert_eq!(parser.parse("4\u{20AC};1"), None);
        assert_eq!(parser.parse("\u{20AC}\u{20AC}"), None);
        assert_eq!(parser.parse("27\u{20AC}1;f.c;68;1"), None);
    }

    #[test]
    fn test_enable_all_has_no_id() {
        let parser = EventParser::new();
        assert_eq!(
            parser.parse("23").unwrap(),
            DebugEvent::Breakpoint(BreakpointEvent::Enabled { id: None })
        );
        assert_eq!(
            parser.parse("23;4").unwrap(),
            DebugEvent::Breakpoint(BreakpointEvent::Enabled { id: Some(4) })
        );
    }
}
