use clap::{arg,crate_version,Command};
use blocktree::build::{build,Params};

const RCH: &str = "unreachable was reached";

fn main() -> Result<(),Box<dyn std::error::Error>>
{
    env_logger::init();
    let long_help =
"Examples:
---------
Statistics:    `blocktree stats -i big.txt --arity 2 --leaf 8`
Access:        `blocktree query -i big.txt -o access -p 1000`
Rank:          `blocktree query -i big.txt -o rank -c e -p 1000`
Select:        `blocktree query -i big.txt -o select -c e -j 50`";

    let ops = ["access","rank","select"];

    let mut main_cmd = Command::new("blocktree")
        .about("Index a file and query it with access, rank and select")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("stats")
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(--arity <COUNT> "children per internal block").default_value("2"))
        .arg(arg!(--leaf <COUNT> "symbols per leaf block").default_value("8"))
        .arg(arg!(--huffman <SAMPLE> "also Huffman-pack the leaves, sampling every SAMPLE symbols"))
        .about("build an index and report its size"));

    main_cmd = main_cmd.subcommand(Command::new("query")
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --op <OP> "query kind").value_parser(ops).required(true))
        .arg(arg!(-c --symbol <CHAR> "symbol argument for rank and select"))
        .arg(arg!(-p --position <POS> "position argument for access and rank"))
        .arg(arg!(-j --occurrence <COUNT> "occurrence argument for select"))
        .arg(arg!(--arity <COUNT> "children per internal block").default_value("2"))
        .arg(arg!(--leaf <COUNT> "symbols per leaf block").default_value("8"))
        .about("build an index and run one query"));

    let matches = main_cmd.get_matches();

    if let Some(cmd) = matches.subcommand_matches("stats") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let dat = std::fs::read(path_in)?;
        let params = Params {
            arity: cmd.get_one::<String>("arity").expect(RCH).parse()?,
            leaf_len: cmd.get_one::<String>("leaf").expect(RCH).parse()?,
            top_blocks: 1
        };
        let mut tree = build(&dat,&params)?;
        if let Some(sample) = cmd.get_one::<String>("huffman") {
            tree.huffman_compress_leaves(sample.parse()?)?;
        }
        println!("input bytes:   {}",tree.len());
        println!("height:        {}",tree.height());
        println!("alphabet size: {}",tree.alphabet().len());
        println!("leaf symbols:  {}",tree.leaf_symbols());
        println!("space usage:   {} bytes",tree.space_usage());
    }

    if let Some(cmd) = matches.subcommand_matches("query") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let op = cmd.get_one::<String>("op").expect(RCH);
        let dat = std::fs::read(path_in)?;
        let params = Params {
            arity: cmd.get_one::<String>("arity").expect(RCH).parse()?,
            leaf_len: cmd.get_one::<String>("leaf").expect(RCH).parse()?,
            top_blocks: 1
        };
        let mut tree = build(&dat,&params)?;
        let symbol = || -> Result<u8,Box<dyn std::error::Error>> {
            let arg = cmd.get_one::<String>("symbol").ok_or("missing --symbol")?;
            match arg.as_bytes() {
                [b] => Ok(*b),
                _ => Err("symbol must be a single byte".into())
            }
        };
        match op.as_str() {
            "access" => {
                let pos: usize = cmd.get_one::<String>("position").ok_or("missing --position")?.parse()?;
                println!("{}",tree.access(pos)? as char);
            },
            "rank" => {
                let pos: usize = cmd.get_one::<String>("position").ok_or("missing --position")?.parse()?;
                tree.add_rank_support(1)?;
                println!("{}",tree.rank(symbol()?,pos)?);
            },
            "select" => {
                let occ: usize = cmd.get_one::<String>("occurrence").ok_or("missing --occurrence")?.parse()?;
                tree.add_rank_support(1)?;
                println!("{}",tree.select(symbol()?,occ)?);
            },
            _ => {
                eprintln!("{} not supported",op);
                return Err(Box::new(std::fmt::Error));
            }
        };
    }

    Ok(())
}
