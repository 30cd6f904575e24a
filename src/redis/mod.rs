//! # Redis Broker
//!
//! This is the remote broker.  It uses a plain Redis list as the
//! queue, which lets producers and workers live in different
//! processes, or on different machines.
//!
//! **NOTE: THIS REQUIRES REDIS 6.0 OR LATER.**  The poller passes a
//! fractional timeout to `BRPOP`, which older servers reject.
//!
//! ## Submitting
//!
//! Submitting is very simple - all it needs to do is serialize the
//! item (see [`codec`][crate::codec]) and issue an `LPUSH` onto the
//! list named by the broker's key, and it's done.  Any failure here,
//! whether serializing or talking to redis, is returned to the
//! caller; nothing is dropped silently on the way in.  Submitting
//! goes through a `bb8` connection pool, as many producers may be
//! submitting at once.
//!
//! ## Dequeuing
//!
//! Dequeuing is a bit more involved.  The first call to
//! [`Dequeuer::dequeue`][crate::Dequeuer::dequeue] spawns a single
//! background poller for the broker; every later call just hands out
//! the same inbox, no matter how many workers ask.  The poller holds
//! its own multiplexed connection, and issues a `BRPOP` against the
//! key with a short timeout (one second, by default) in a loop.
//! Since we push on the left and pop on the right, the list behaves
//! as a FIFO queue, not a stack.
//!
//! The timeout should be kept short: the poller only notices it has
//! been cancelled between pops, so stopping can take up to one poll
//! timeout.  A pop that is under way when the poller is cancelled is
//! left to finish.
//!
//! The poller pops one item at a time, and waits for room to hand it
//! over before popping the next, which keeps at most two items out of
//! redis at a time: one buffered
//! for the next consumer, and one waiting to take its place.  When the
//! poller is cancelled, neither is dropped.  Both are pushed back onto
//! the right of the list with `RPUSH`, in the order they were popped,
//! so they are the next items any poller pops.  An item a consumer has
//! already received is the consumer's; it isn't returned.  The only way
//! to lose a popped item is for redis to become unreachable between the
//! pop and the push back; that is logged as an error.
//!
//! The poller never gives up.  A `BRPOP` timing out is not an error;
//! we just wait again.  A transport error is logged, the connection is
//! dropped, and a new one is tried after waiting out one poll timeout,
//! so a downed redis doesn't turn into a retry storm.  An item that cannot be deserialized is logged and
//! dropped - there is no dead-letter list, so this is a real data
//! loss path, and the log line is the only trace of it.
//!
//! Once the cancellation token the poller was started with fires, the
//! poller stops for good.  A broker can't be restarted; make a new one.

mod broker;

pub use self::broker::{PollState, RedisBroker};
