//! The 64-bit message id: a 2-bit category packed with a 62-bit request
//! number.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const CATEGORY_SHIFT: u32 = 62;
const REQUEST_MASK: u64 = (1u64 << CATEGORY_SHIFT) - 1;

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Normal,
    Urgent,
    Response,
    ErrorResponse,
}

impl Category {
    fn tag(self) -> u64 {
        match self {
            Category::Normal => 0,
            Category::Urgent => 1,
            Category::Response => 2,
            Category::ErrorResponse => 3,
        }
    }

    fn from_tag(tag: u64) -> Category {
        match tag {
            0 => Category::Normal,
            1 => Category::Urgent,
            2 => Category::Response,
            3 => Category::ErrorResponse,
            _ => unreachable!("only two bits are ever stored"),
        }
    }
}

/// Packs a [`Category`] and a request number into a single `u64`.
///
/// Asynchronous messages use the all-zero id. A response's request number is
/// the bitwise complement (within the 62-bit field) of the request it
/// answers, so recovering the original request number is the same
/// complement operation applied a second time.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(u64);

impl MessageId {
    pub const ASYNC: MessageId = MessageId(0);

    /// Mints a fresh, normal-priority request id from the process-wide
    /// monotonic request counter.
    pub fn new_request() -> MessageId {
        Self::new_request_with_category(Category::Normal)
    }

    pub fn new_urgent_request() -> MessageId {
        Self::new_request_with_category(Category::Urgent)
    }

    fn new_request_with_category(category: Category) -> MessageId {
        let n = NEXT_REQUEST.fetch_add(1, Ordering::Relaxed) & REQUEST_MASK;
        MessageId::pack(category, n)
    }

    fn pack(category: Category, request_number: u64) -> MessageId {
        MessageId((category.tag() << CATEGORY_SHIFT) | (request_number & REQUEST_MASK))
    }

    pub fn is_async(self) -> bool {
        self.0 == 0
    }

    pub fn category(self) -> Category {
        Category::from_tag(self.0 >> CATEGORY_SHIFT)
    }

    pub fn request_number(self) -> u64 {
        self.0 & REQUEST_MASK
    }

    pub fn is_response(self) -> bool {
        matches!(self.category(), Category::Response | Category::ErrorResponse)
    }

    /// Builds the id a response to this request carries.
    pub fn response_id(self) -> MessageId {
        MessageId::pack(Category::Response, !self.request_number() & REQUEST_MASK)
    }

    /// Builds the id an error-response to this request carries.
    pub fn error_response_id(self) -> MessageId {
        MessageId::pack(Category::ErrorResponse, !self.request_number() & REQUEST_MASK)
    }

    /// Recovers the request number of the request this response or
    /// error-response answers (the complement operation applied a second
    /// time). Only meaningful when `is_response()` is true.
    pub fn answered_request_number(self) -> u64 {
        !self.request_number() & REQUEST_MASK
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_async() {
            write!(f, "MessageId(async)")
        } else {
            write!(f, "MessageId({:?}, #{})", self.category(), self.request_number())
        }
    }
}
