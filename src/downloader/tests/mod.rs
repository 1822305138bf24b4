use super::*;

mod control;
