use super::test_helpers::*;
use super::*;
use crate::error::Error;
use crate::types::{OutputFileType, TaskStatus, TranslationOptions};
use chrono::Utc;
use std::time::Duration;

mod lifecycle;
