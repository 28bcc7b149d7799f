use dailypaper::retry::RetryPolicy;
use wiremock::{
  matchers::{header, method, path, query_param},
  Mock, MockServer, ResponseTemplate,
};

use super::*;

mod analyzer;
mod catalog;
mod fetcher;
