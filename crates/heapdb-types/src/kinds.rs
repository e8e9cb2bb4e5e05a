use facet::Facet;

/// What keeps a root alive.
#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RootKind {
    /// Static field of a type.
    StaticVar,
    /// Thread-static field.
    ThreadStaticVar,
    /// Stack slot or register of a live frame.
    LocalVar,
    /// Strong handle.
    Strong,
    /// Weak handle (short or long).
    Weak,
    /// Pinned handle.
    Pinning,
    /// Object queued for finalization.
    Finalizer,
    /// Buffer pinned for an in-flight async I/O operation.
    AsyncPinning,
    /// The provider reported a kind this model does not know.
    Unrecognized,
}

impl RootKind {
    /// Known kinds, indexed by the runtime's numeric discriminant.
    pub const KNOWN: [Self; 8] = [
        Self::StaticVar,
        Self::ThreadStaticVar,
        Self::LocalVar,
        Self::Strong,
        Self::Weak,
        Self::Pinning,
        Self::Finalizer,
        Self::AsyncPinning,
    ];

    /// Maps the runtime's numeric discriminant (in declaration order above).
    pub fn from_code(code: u32) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::KNOWN.get(index).copied())
            .unwrap_or(Self::Unrecognized)
    }

    /// Parses a canonical tag; anything else is `Unrecognized`.
    pub fn from_tag(tag: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|known| known.tag() == Some(tag))
            .unwrap_or(Self::Unrecognized)
    }

    /// Canonical tag, `None` for `Unrecognized`.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Self::StaticVar => Some("StaticVar"),
            Self::ThreadStaticVar => Some("ThreadStaticVar"),
            Self::LocalVar => Some("LocalVar"),
            Self::Strong => Some("Strong"),
            Self::Weak => Some("Weak"),
            Self::Pinning => Some("Pinning"),
            Self::Finalizer => Some("Finalizer"),
            Self::AsyncPinning => Some("AsyncPinning"),
            Self::Unrecognized => None,
        }
    }
}

/// Why threads are blocked on a synchronization object.
#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BlockingReason {
    None,
    /// The runtime itself could not tell.
    Unknown,
    Monitor,
    MonitorWait,
    WaitOne,
    WaitAll,
    WaitAny,
    ThreadJoin,
    ReaderAcquired,
    WriterAcquired,
    /// The provider reported a reason this model does not know.
    Unrecognized,
}

impl BlockingReason {
    pub const KNOWN: [Self; 10] = [
        Self::None,
        Self::Unknown,
        Self::Monitor,
        Self::MonitorWait,
        Self::WaitOne,
        Self::WaitAll,
        Self::WaitAny,
        Self::ThreadJoin,
        Self::ReaderAcquired,
        Self::WriterAcquired,
    ];

    pub fn from_code(code: u32) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::KNOWN.get(index).copied())
            .unwrap_or(Self::Unrecognized)
    }

    pub fn from_tag(tag: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|known| known.tag() == Some(tag))
            .unwrap_or(Self::Unrecognized)
    }

    pub fn tag(self) -> Option<&'static str> {
        match self {
            Self::None => Some("None"),
            Self::Unknown => Some("Unknown"),
            Self::Monitor => Some("Monitor"),
            Self::MonitorWait => Some("MonitorWait"),
            Self::WaitOne => Some("WaitOne"),
            Self::WaitAll => Some("WaitAll"),
            Self::WaitAny => Some("WaitAny"),
            Self::ThreadJoin => Some("ThreadJoin"),
            Self::ReaderAcquired => Some("ReaderAcquired"),
            Self::WriterAcquired => Some("WriterAcquired"),
            Self::Unrecognized => None,
        }
    }
}
