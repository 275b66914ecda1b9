use crate::Address;
use std::collections::HashSet;

/// Known exchange and service addresses excluded from correlation output.
///
/// High-volume custodial and router addresses interact with a large share
/// of all wallets, so treating them as common counterparties adds noise
/// without signal. Checked against canonical (lowercase) addresses.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    addresses: HashSet<Address>,
}

const KNOWN_SERVICES: &[&str] = &[
    // Binance
    "0x28c6c06298d514db089934071355e5743bf21d60",
    "0xdfd5293d8e347dfe59e90efd55b2956a1343963d",
    "0x3f5ce5fbfe3e9af3971dd833d26ba9b5c936f0be",
    "0xd551234ae421e3bcba99a0da6d736074f22192ff",
    "0x564286362092d8e7936f0549571a803b203aaced",
    "0x0681d8db095565fe8a346fa0277bffde9c0edbbf",
    "0xfe9e8709d3215310075d67e3ed32a380ccf451c8",
    "0x4e9ce36e442e55ecd9025b9a6e0d88485d628a67",
    "0xbe0eb53f46cd790cd13851d5eff43d12404d33e8",
    "0xf977814e90da44bfa03b6295a0616a897441acec",
    "0x8315177ab297ba92a06054ce80a67ed4dbd7ed3a",
    // Coinbase
    "0x2faf487a4414fe77e2327f0bf4ae2a264a776ad2",
    "0xeb2629a2734e272bcc07bda959863f316f4bd4cf",
    "0x503828976d22510aad0201ac7ec88293211d23da",
    "0xddfabcdc4d8ffc6d5beaf154f18b778f892a0740",
    // Kraken
    "0x4ad64983349c49defe8d7a4686202d24b25f366f",
    "0x267be1c1d684f78cb4f6a176c4911b741e4ffdc0",
    // Gemini
    "0x701c484bfb40ac628afa487b6082f084b14af0bd",
    "0xd24400ae8bfebb18ca49be86258a3c749cf46853",
    // KuCoin
    "0x05f51aab068caa6ab7eeb672f88c180f67f17ec7",
    // 1inch
    "0x11111112542d85b3ef69ae05771c2dccff4faa26",
    "0x1111111254fb6c44bac0bed2854e76f90643097d",
    "0x1111111254eeb25477b68fb85ed929f73a960582",
    // Uniswap routers
    "0x7a250d5630b4cf539739df2c5dacb4c659f2488d",
    "0x68b3465833fb72a70ecdf485e0e4c7bd8665fc45",
    // SushiSwap
    "0xd9e1ce17f2641f24ae83637ab66a2cca9c378b9f",
    // Metamask swap router
    "0x881d40237659c251811cec9c364ef91dc08d300c",
    // Ethereum 2.0 deposit contract
    "0x00000000219ab540356cbb839cbe05303d7705fa",
    // WETH
    "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
    // Stablecoins: USDC, USDT, DAI
    "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
    "0xdac17f958d2ee523a2206206994597c13d831ec7",
    "0x6b175474e89094c44da98b954eedeac495271d0f",
    // High-volume market makers
    "0x3883f5e181cacd4fdf2a2d6724999b12ce1dc93c",
    "0x08638ef1a205be6762a8b935f5da9b700cf7322c",
];

impl ExclusionSet {
    /// Empty set: nothing is excluded.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in list of exchanges, routers, token contracts and market
    /// makers.
    pub fn known_services() -> Self {
        let addresses = KNOWN_SERVICES
            .iter()
            .map(|s| Address::parse(s).expect("built-in service address is valid"))
            .collect();
        Self { addresses }
    }

    /// Extend with additional addresses from configuration.
    pub fn with_extra(mut self, extra: impl IntoIterator<Item = Address>) -> Self {
        self.addresses.extend(extra);
        self
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
