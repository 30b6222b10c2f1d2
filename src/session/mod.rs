mod session;

pub use session::{JobOutput, Session, SessionError, SessionEvent};
