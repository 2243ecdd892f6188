//! Session state machine tests, driven entirely through mocked seams.

mod harness;
