use std::env;
use std::error::Error;

use reschunk::{decode_apk_manifest, decode_file, ChunkBody, Document};

// Lists the chunks of a compiled resource file, printing the contents of every string pool.
// Accepts a compiled AndroidManifest.xml / resources.arsc, or an APK to pull the manifest from.

//Usage: dump_chunks <file> [--json]
fn main()
{
    let args: Vec<String> = env::args().collect();
    if args.len() < 2
    {
        eprintln!("Usage: {} <AndroidManifest.xml | app.apk> [--json]", args[0]);
        std::process::exit(2);
    }
    let json = args.iter().skip(2).any(|arg| arg == "--json");

    match dump(&args[1], json) {
        Ok(_) => {}
        Err(e) => {
            eprintln!("Aborted due to error: {}", e);
            std::process::exit(1);
        }
    }
}

fn dump(path: &str, json: bool) -> Result<(), Box<dyn Error>>
{
    let doc = if path.ends_with(".apk") { decode_apk_manifest(path)? } else { decode_file(path)? };

    if json
    {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }
    print_document(&doc);
    Ok(())
}

fn print_document(doc: &Document)
{
    println!("{} header_size={} size={}", doc.root.kind(), doc.root.header_size, doc.root.chunk_size);
    for chunk in &doc.chunks
    {
        print!("  0x{:08x} {} size={}", chunk.offset, chunk.kind, chunk.header.chunk_size);
        match &chunk.body
        {
            ChunkBody::StringPool(pool) => {
                println!(" strings={} styles={} encoding={:?}", pool.strings.len(), pool.styles.len(), pool.encoding());
                for (i, s) in pool.strings.iter().enumerate()
                {
                    println!("    [{}] {:?}", i, s);
                }
                for (i, s) in pool.styles.iter().enumerate()
                {
                    println!("    style[{}] {:?}", i, s);
                }
            }
            ChunkBody::ResourceMap => println!(" (resource map not decoded)"),
            ChunkBody::Skipped(_) => println!(" (not decoded)"),
            ChunkBody::Opaque(code) => println!(" (unknown type 0x{:04x})", code),
            ChunkBody::Failed(err) => println!(" FAILED: {}", err),
        }
    }
}
