/// PIN-based secondary authentication with attempt counting and timed
/// lockout

mod guard;

pub use guard::PinGuard;
