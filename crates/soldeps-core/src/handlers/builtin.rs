//! Built-in handlers for the unit-testing libraries test contracts import.

use super::{
    HandlerPattern, ImportHandler, ImportHandlerContext, ImportHandlerRegistry,
    ImportHandlerResult,
};
use async_trait::async_trait;
use std::fmt::Write;
use std::sync::Arc;

/// Import path of the assertion library.
pub const TESTS_IMPORT: &str = "remix_tests.sol";

/// Import path of the test accounts library.
pub const ACCOUNTS_IMPORT: &str = "remix_accounts.sol";

/// Accounts of the default in-browser VM.
pub const DEFAULT_ACCOUNTS: [&str; 4] = [
    "0x5B38Da6a701c568545dCfcB03FcB875f56beddC4",
    "0xAb8483F64d9C6d1EcF9b849Ae677dD3315835cb2",
    "0x4B20993Bc481177ec7E8f571ceCaE8A9e22C02db",
    "0x78731D3Ca6b7E34aC0F824c42a7cC18A495cabaB",
];

const ASSERT_LIBRARY: &str = r#"// SPDX-License-Identifier: MIT
pragma solidity >=0.4.22 <0.9.0;

library Assert {
    event AssertionEvent(bool passed, string message, string methodName);

    event AssertionEventUint(bool passed, string message, string methodName, uint256 returned, uint256 expected);

    event AssertionEventInt(bool passed, string message, string methodName, int256 returned, int256 expected);

    event AssertionEventBool(bool passed, string message, string methodName, bool returned, bool expected);

    event AssertionEventAddress(bool passed, string message, string methodName, address returned, address expected);

    event AssertionEventBytes32(bool passed, string message, string methodName, bytes32 returned, bytes32 expected);

    event AssertionEventString(bool passed, string message, string methodName, string returned, string expected);

    function ok(bool a, string memory message) public returns (bool result) {
        result = a;
        emit AssertionEvent(result, message, "ok");
    }

    function equal(uint256 a, uint256 b, string memory message) public returns (bool result) {
        result = (a == b);
        emit AssertionEventUint(result, message, "equal", a, b);
    }

    function equal(int256 a, int256 b, string memory message) public returns (bool result) {
        result = (a == b);
        emit AssertionEventInt(result, message, "equal", a, b);
    }

    function equal(bool a, bool b, string memory message) public returns (bool result) {
        result = (a == b);
        emit AssertionEventBool(result, message, "equal", a, b);
    }

    function equal(address a, address b, string memory message) public returns (bool result) {
        result = (a == b);
        emit AssertionEventAddress(result, message, "equal", a, b);
    }

    function equal(bytes32 a, bytes32 b, string memory message) public returns (bool result) {
        result = (a == b);
        emit AssertionEventBytes32(result, message, "equal", a, b);
    }

    function equal(string memory a, string memory b, string memory message) public returns (bool result) {
        result = (keccak256(abi.encodePacked(a)) == keccak256(abi.encodePacked(b)));
        emit AssertionEventString(result, message, "equal", a, b);
    }

    function notEqual(uint256 a, uint256 b, string memory message) public returns (bool result) {
        result = (a != b);
        emit AssertionEventUint(result, message, "notEqual", a, b);
    }

    function notEqual(int256 a, int256 b, string memory message) public returns (bool result) {
        result = (a != b);
        emit AssertionEventInt(result, message, "notEqual", a, b);
    }

    function notEqual(bool a, bool b, string memory message) public returns (bool result) {
        result = (a != b);
        emit AssertionEventBool(result, message, "notEqual", a, b);
    }

    function notEqual(address a, address b, string memory message) public returns (bool result) {
        result = (a != b);
        emit AssertionEventAddress(result, message, "notEqual", a, b);
    }

    function notEqual(bytes32 a, bytes32 b, string memory message) public returns (bool result) {
        result = (a != b);
        emit AssertionEventBytes32(result, message, "notEqual", a, b);
    }

    function notEqual(string memory a, string memory b, string memory message) public returns (bool result) {
        result = (keccak256(abi.encodePacked(a)) != keccak256(abi.encodePacked(b)));
        emit AssertionEventString(result, message, "notEqual", a, b);
    }

    function greaterThan(uint256 a, uint256 b, string memory message) public returns (bool result) {
        result = (a > b);
        emit AssertionEventUint(result, message, "greaterThan", a, b);
    }

    function greaterThan(int256 a, int256 b, string memory message) public returns (bool result) {
        result = (a > b);
        emit AssertionEventInt(result, message, "greaterThan", a, b);
    }

    function lesserThan(uint256 a, uint256 b, string memory message) public returns (bool result) {
        result = (a < b);
        emit AssertionEventUint(result, message, "lesserThan", a, b);
    }

    function lesserThan(int256 a, int256 b, string memory message) public returns (bool result) {
        result = (a < b);
        emit AssertionEventInt(result, message, "lesserThan", a, b);
    }
}
"#;

/// Serves the assertion library.
pub struct AssertLibraryHandler {
    pattern: HandlerPattern,
}

impl Default for AssertLibraryHandler {
    fn default() -> Self {
        Self {
            pattern: HandlerPattern::exact(TESTS_IMPORT),
        }
    }
}

#[async_trait]
impl ImportHandler for AssertLibraryHandler {
    fn name(&self) -> &str {
        "builtin:tests"
    }

    fn pattern(&self) -> &HandlerPattern {
        &self.pattern
    }

    async fn handle(&self, _ctx: &ImportHandlerContext<'_>) -> ImportHandlerResult {
        ImportHandlerResult::handled(ASSERT_LIBRARY)
    }
}

/// Serves a `TestsAccounts` library over a fixed account list.
pub struct AccountsHandler {
    pattern: HandlerPattern,
    accounts: Vec<String>,
}

impl AccountsHandler {
    #[must_use]
    pub fn new(accounts: Vec<String>) -> Self {
        Self {
            pattern: HandlerPattern::exact(ACCOUNTS_IMPORT),
            accounts,
        }
    }

    /// Solidity source of the accounts library.
    #[must_use]
    pub fn render(&self) -> String {
        let mut body = String::new();
        for (i, account) in self.accounts.iter().enumerate() {
            let _ = writeln!(body, "        accounts[{i}] = {account};");
        }
        format!(
            "// SPDX-License-Identifier: MIT\n\
             pragma solidity >=0.4.22 <0.9.0;\n\n\
             library TestsAccounts {{\n    \
             function getAccount(uint256 index) public pure returns (address) {{\n        \
             address[{count}] memory accounts;\n\
             {body}        \
             return accounts[index];\n    \
             }}\n\
             }}\n",
            count = self.accounts.len().max(1),
        )
    }
}

impl Default for AccountsHandler {
    fn default() -> Self {
        Self::new(DEFAULT_ACCOUNTS.iter().map(ToString::to_string).collect())
    }
}

#[async_trait]
impl ImportHandler for AccountsHandler {
    fn name(&self) -> &str {
        "builtin:accounts"
    }

    fn pattern(&self) -> &HandlerPattern {
        &self.pattern
    }

    async fn handle(&self, _ctx: &ImportHandlerContext<'_>) -> ImportHandlerResult {
        ImportHandlerResult::handled(self.render())
    }
}

/// Register the assertion and accounts handlers.
pub fn register_builtins(registry: &ImportHandlerRegistry) {
    registry.register(Arc::new(AssertLibraryHandler::default()));
    registry.register(Arc::new(AccountsHandler::default()));
}
